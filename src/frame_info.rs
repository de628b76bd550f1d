use crate::Frame;

/// Represents an input for a single frame. The associated frame is denoted
/// with `frame`; [`Frame::NULL`] marks an invalid / not-yet-assigned input.
///
/// Inputs are immutable value objects: they are created by the local
/// simulation once per frame, transmitted, and superseded (never edited) when
/// a later frame's input arrives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GameInput<I>
where
    I: Copy + Clone + PartialEq,
{
    /// The frame to which this input belongs.
    pub frame: Frame,
    /// The input payload given by the user.
    pub input: I,
}

impl<I: Copy + Clone + PartialEq + Default> GameInput<I> {
    /// Creates a new `GameInput` with the given frame and input.
    pub fn new(frame: Frame, input: I) -> Self {
        Self { frame, input }
    }

    /// Creates a blank input with the default value for the input type.
    #[must_use]
    pub fn blank(frame: Frame) -> Self {
        Self {
            frame,
            input: I::default(),
        }
    }
}

// #########
// # TESTS #
// #########
