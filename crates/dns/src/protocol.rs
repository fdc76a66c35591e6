use crate::{
    Error, Flags, Header, Question, Result, ANSWER_NAME_POINTER, ANSWER_TTL,
    DEFAULT_ANSWER_ADDRESS, HEADER_LENGTH, MAX_DATAGRAM_SIZE,
};
use bytes::Buf;
use cookie_factory::{
    bytes::{be_u16, be_u32},
    combinator::slice,
    gen_simple,
    sequence::tuple,
    SerializeFn,
};
use std::io::Write;
use std::net::Ipv4Addr;

const MAX_LABEL_LENGTH: usize = 63;

impl Header {
    pub fn decode(mut buffer: &[u8]) -> Result<Self> {
        if buffer.remaining() < HEADER_LENGTH {
            return Err(Error::MalformedHeader);
        }
        let id = buffer.get_u16();
        let flags = Flags::from_bits_retain(buffer.get_u16());
        let question_count = buffer.get_u16();
        let answer_count = buffer.get_u16();
        let authority_count = buffer.get_u16();
        let additional_count = buffer.get_u16();
        Ok(Header {
            id,
            flags,
            question_count,
            answer_count,
            authority_count,
            additional_count,
        })
    }

    /// One synthetic answer per question, standard response without error.
    pub fn into_response(self) -> Self {
        Header {
            flags: Flags::STANDARD_RESPONSE,
            answer_count: self.question_count,
            ..self
        }
    }
}

impl<'a> Question<'a> {
    /// Decodes the question starting at `offset` and returns it together with
    /// the number of bytes it occupies. Only literal labels are accepted.
    pub fn decode(
        message: &'a [u8],
        offset: usize,
    ) -> Result<(Self, usize)> {
        let input = message.get(offset..).ok_or(Error::MalformedQuestion)?;
        let mut buffer = input;
        loop {
            if !buffer.has_remaining() {
                return Err(Error::MalformedQuestion);
            }
            let length = buffer.get_u8() as usize;
            if length == 0 {
                break;
            }
            if length > MAX_LABEL_LENGTH || buffer.remaining() < length {
                return Err(Error::MalformedQuestion);
            }
            buffer.advance(length);
        }
        let name_length = input.len() - buffer.remaining();
        if buffer.remaining() < 4 {
            return Err(Error::MalformedQuestion);
        }
        let qtype = buffer.get_u16();
        let qclass = buffer.get_u16();
        let consumed = name_length + 4;
        Ok((
            Question {
                name: &input[..name_length],
                qtype,
                qclass,
                raw: &input[..consumed],
            },
            consumed,
        ))
    }
}

pub fn encode_response(
    header: Header,
    message: &[u8],
) -> Result<Vec<u8>> {
    encode_response_with_address(header, message, DEFAULT_ANSWER_ADDRESS)
}

/// Builds the response to `message`: the header, then for each question the
/// question as received followed by an A record for `address`.
///
/// Every answer names offset 12, which is only the right name for the first
/// question.
pub fn encode_response_with_address(
    header: Header,
    message: &[u8],
    address: Ipv4Addr,
) -> Result<Vec<u8>> {
    let header = header.into_response();
    let buffer = Vec::with_capacity(MAX_DATAGRAM_SIZE);
    let mut buffer = gen_simple(encode_header(header), buffer)?;
    let mut offset = HEADER_LENGTH;
    for _ in 0..header.question_count {
        let (question, consumed) = Question::decode(message, offset)?;
        offset += consumed;
        buffer = gen_simple(
            tuple((slice(question.raw), encode_answer(&question, address))),
            buffer,
        )?;
    }
    Ok(buffer)
}

#[inline(always)]
fn encode_header<W: Write>(value: Header) -> impl SerializeFn<W> {
    tuple((
        be_u16(value.id),
        be_u16(value.flags.bits()),
        be_u16(value.question_count),
        be_u16(value.answer_count),
        be_u16(value.authority_count),
        be_u16(value.additional_count),
    ))
}

#[inline(always)]
fn encode_answer<W: Write>(
    question: &Question,
    address: Ipv4Addr,
) -> impl SerializeFn<W> {
    let rdata = address.octets();
    tuple((
        be_u16(ANSWER_NAME_POINTER),
        be_u16(question.qtype),
        be_u16(question.qclass),
        be_u32(ANSWER_TTL),
        be_u16(rdata.len() as u16),
        slice(rdata),
    ))
}
