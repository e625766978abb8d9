//! Multi-frame Messages
//!
//! A message is an ordered, non-empty sequence of opaque binary frames.
//! The proxy never looks inside a frame and never merges or splits frames;
//! a message leaves the proxy exactly as it arrived.

/// A single opaque frame.
pub type Frame = Vec<u8>;

/// An ordered, non-empty sequence of frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    frames: Vec<Frame>,
}

impl Message {
    /// Build a message from its frames.
    ///
    /// # Errors
    ///
    /// Returns `MessageError::Empty` if `frames` is empty.
    pub fn from_frames(frames: Vec<Frame>) -> Result<Self, MessageError> {
        if frames.is_empty() {
            return Err(MessageError::Empty);
        }
        Ok(Self { frames })
    }

    /// Build a single-frame message.
    #[must_use]
    pub fn single(frame: impl Into<Frame>) -> Self {
        Self {
            frames: vec![frame.into()],
        }
    }

    /// Borrow the frames in order.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of frames.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Total payload size across all frames.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }

    /// Consume the message, yielding its frames.
    #[must_use]
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl TryFrom<Vec<Frame>> for Message {
    type Error = MessageError;

    fn try_from(frames: Vec<Frame>) -> Result<Self, Self::Error> {
        Self::from_frames(frames)
    }
}

/// Message construction error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// A message must carry at least one frame.
    #[error("message must contain at least one frame")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frames_rejected() {
        assert_eq!(Message::from_frames(vec![]), Err(MessageError::Empty));
    }

    #[test]
    fn empty_frame_inside_message_is_kept() {
        let msg = Message::from_frames(vec![b"topic".to_vec(), vec![], b"body".to_vec()]).unwrap();
        assert_eq!(msg.frame_count(), 3);
        assert!(msg.frames()[1].is_empty());
    }

    #[test]
    fn byte_len_sums_frames() {
        let msg = Message::from_frames(vec![vec![0; 3], vec![1; 5]]).unwrap();
        assert_eq!(msg.byte_len(), 8);
    }

    #[test]
    fn single_frame_message() {
        let msg = Message::single(&b"\x01weather"[..]);
        assert_eq!(msg.frame_count(), 1);
        assert_eq!(msg.into_frames(), vec![b"\x01weather".to_vec()]);
    }

    #[test]
    fn try_from_vec() {
        let msg: Message = vec![b"a".to_vec()].try_into().unwrap();
        assert_eq!(msg.frames(), &[b"a".to_vec()]);
    }
}
