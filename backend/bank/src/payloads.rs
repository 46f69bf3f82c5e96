//! Protobuf payloads exchanged with the frontend.
//!
//! Answers are tiny and sent once per question, so they travel as protobuf
//! bodies instead of JSON.
use prost::{DecodeError, Message, bytes::Buf};

#[derive(Clone, PartialEq, Message)]
pub struct Answer {
    /// Index into the current question's options.
    #[prost(uint32, tag = "1")]
    pub option_index: u32,
}

pub fn get_answer_from_bytes<B: Buf>(buf: B) -> Result<Answer, DecodeError> {
    Answer::decode(buf)
}
