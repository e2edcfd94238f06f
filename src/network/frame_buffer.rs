use crate::{AppError, AppResult};

/// Fixed-capacity accumulation buffer for the payload of one frame.
///
/// The backing storage is allocated once and reused for every frame, so
/// `len()` never exceeds `capacity()`; writes past the end are rejected with
/// [`AppError::FrameTooLarge`] instead of growing.
#[derive(Debug)]
pub struct FrameBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl FrameBuffer {
    /// Allocates the buffer up front.
    ///
    /// Allocation failure surfaces as [`AppError::ResourceExhausted`].
    pub fn with_capacity(capacity: usize) -> AppResult<FrameBuffer> {
        if capacity == 0 {
            return Err(AppError::InvalidValue(
                "frame buffer capacity must be positive".into(),
            ));
        }
        let mut data = Vec::new();
        data.try_reserve_exact(capacity).map_err(|e| {
            AppError::ResourceExhausted(format!(
                "cannot allocate {} byte frame buffer: {}",
                capacity, e
            ))
        })?;
        Ok(FrameBuffer { data, capacity })
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> AppResult<()> {
        let len = self.data.len();
        if bytes.len() > self.capacity - len {
            return Err(AppError::FrameTooLarge {
                declared: len + bytes.len(),
                capacity: self.capacity,
            });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Empties the buffer, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}
