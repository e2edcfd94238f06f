//! Incremental substring search over a chunked byte stream.
//!
//! A [`SearchPattern`] remembers how many leading pattern bytes match the tail
//! of everything fed so far, so an occurrence split across any number of
//! socket reads is found exactly once. Mismatches fall back along the
//! pattern's prefix function instead of restarting from zero, which keeps
//! self-overlapping patterns (e.g. `--` runs in multipart boundaries) correct.

#[derive(Debug, Clone)]
pub struct SearchPattern {
    pattern: Box<[u8]>,
    /// `fallback[i]`: length of the longest proper border of `pattern[..=i]`
    fallback: Box<[usize]>,
    ignore_case: bool,
    matched: usize,
}

impl SearchPattern {
    /// Case-sensitive pattern.
    ///
    /// An empty pattern never matches.
    pub fn new(pattern: impl AsRef<[u8]>) -> Self {
        Self::build(pattern.as_ref().to_vec(), false)
    }

    /// Pattern compared with ASCII case folding, as HTTP header names are.
    pub fn ignore_ascii_case(pattern: impl AsRef<[u8]>) -> Self {
        Self::build(pattern.as_ref().to_ascii_lowercase(), true)
    }

    fn build(pattern: Vec<u8>, ignore_case: bool) -> Self {
        let mut fallback = vec![0usize; pattern.len()];
        let mut border = 0;
        for i in 1..pattern.len() {
            while border > 0 && pattern[i] != pattern[border] {
                border = fallback[border - 1];
            }
            if pattern[i] == pattern[border] {
                border += 1;
            }
            fallback[i] = border;
        }
        SearchPattern {
            pattern: pattern.into_boxed_slice(),
            fallback: fallback.into_boxed_slice(),
            ignore_case,
            matched: 0,
        }
    }

    /// Advances the match state by one byte.
    ///
    /// Returns `true` when this byte completes the pattern; the match state is
    /// then back at zero.
    #[inline]
    pub fn push(&mut self, byte: u8) -> bool {
        if self.pattern.is_empty() {
            return false;
        }
        let byte = if self.ignore_case {
            byte.to_ascii_lowercase()
        } else {
            byte
        };
        while self.matched > 0 && self.pattern[self.matched] != byte {
            self.matched = self.fallback[self.matched - 1];
        }
        if self.pattern[self.matched] == byte {
            self.matched += 1;
        }
        if self.matched == self.pattern.len() {
            self.matched = 0;
            return true;
        }
        false
    }

    /// Feeds `chunk` until the pattern completes.
    ///
    /// Returns the offset just past the matching byte, or `None` when the
    /// whole chunk was consumed without a full match. Bytes after the returned
    /// offset have not been fed.
    pub fn find(&mut self, chunk: &[u8]) -> Option<usize> {
        chunk
            .iter()
            .position(|&b| self.push(b))
            .map(|index| index + 1)
    }

    /// Number of pattern bytes matched by the tail of the input so far.
    pub fn matched(&self) -> usize {
        self.matched
    }

    pub fn reset(&mut self) {
        self.matched = 0;
    }

    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pattern
    }
}
