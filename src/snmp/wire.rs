// Copyright 2026 loopd contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Minimal SNMPv2c BER/DER codec: just enough to encode GetRequest and
//! GetBulkRequest PDUs and decode GetResponse PDUs over UDP.
//!
//! No SNMP crate appears in any retrieved example's `Cargo.toml`, and
//! spec.md §1 scopes the SNMP wire library itself out of the core ("only
//! its semantic contract is used") — so this is a narrow internal codec
//! covering exactly the message types spec.md names, not a general ASN.1
//! library. Tag values follow RFC 1905 (SNMPv2 PDU framing) and RFC 2578
//! (SMIv2 application types).

use crate::error::{Error, Result};
use crate::snmp::oids::Oid;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;

const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_COUNTER64: u8 = 0x46;

const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;

const PDU_GET_REQUEST: u8 = 0xA0;
const PDU_GET_NEXT_REQUEST: u8 = 0xA1;
const PDU_GET_RESPONSE: u8 = 0xA2;
const PDU_GET_BULK_REQUEST: u8 = 0xA5;

pub const SNMP_VERSION_V2C: i64 = 1;

/// A decoded SNMP value. Only the subset this daemon ever receives is modeled.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    OctetString(Vec<u8>),
    ObjectId(Oid),
    Null,
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl Value {
    pub fn as_object_id_string(&self) -> Option<String> {
        match self {
            Value::ObjectId(oid) => Some(
                oid.iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join("."),
            ),
            _ => None,
        }
    }

    pub fn as_timeticks(&self) -> Option<u32> {
        match self {
            Value::TimeTicks(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_counter64(&self) -> Option<u64> {
        match self {
            Value::Counter64(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: Value,
}

/// A decoded GetResponse PDU.
#[derive(Debug, Clone)]
pub struct Response {
    pub request_id: i64,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<VarBind>,
}

// --- encoding -----------------------------------------------------------

fn encode_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    let significant = &bytes[first_nonzero..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

fn encode_tlv(tag: u8, content: &[u8], out: &mut Vec<u8>) {
    out.push(tag);
    encode_length(content.len(), out);
    out.extend_from_slice(content);
}

fn encode_integer(value: i64) -> Vec<u8> {
    let mut bytes = value.to_be_bytes().to_vec();
    // Strip redundant leading sign-extension bytes, keeping at least one.
    while bytes.len() > 1
        && ((bytes[0] == 0x00 && bytes[1] & 0x80 == 0) || (bytes[0] == 0xFF && bytes[1] & 0x80 != 0))
    {
        bytes.remove(0);
    }
    bytes
}

fn encode_oid(oid: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    if oid.len() < 2 {
        return out;
    }
    out.push((oid[0] * 40 + oid[1]) as u8);
    for &sub in &oid[2..] {
        out.extend(encode_base128(sub));
    }
    out
}

fn encode_base128(mut value: u32) -> Vec<u8> {
    let mut chunks = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        chunks.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    chunks.reverse();
    chunks
}

fn encode_varbind_null(oid: &Oid) -> Vec<u8> {
    let mut body = Vec::new();
    encode_tlv(TAG_OID, &encode_oid(oid), &mut body);
    encode_tlv(TAG_NULL, &[], &mut body);
    let mut out = Vec::new();
    encode_tlv(TAG_SEQUENCE, &body, &mut out);
    out
}

fn encode_message(pdu_tag: u8, community: &str, request_id: i64, arg2: i64, arg3: i64, oids: &[Oid]) -> Vec<u8> {
    let mut varbinds = Vec::new();
    for oid in oids {
        varbinds.extend(encode_varbind_null(oid));
    }
    let mut varbind_seq = Vec::new();
    encode_tlv(TAG_SEQUENCE, &varbinds, &mut varbind_seq);

    let mut pdu_body = Vec::new();
    encode_tlv(TAG_INTEGER, &encode_integer(request_id), &mut pdu_body);
    encode_tlv(TAG_INTEGER, &encode_integer(arg2), &mut pdu_body);
    encode_tlv(TAG_INTEGER, &encode_integer(arg3), &mut pdu_body);
    pdu_body.extend(varbind_seq);

    let mut pdu = Vec::new();
    encode_tlv(pdu_tag, &pdu_body, &mut pdu);

    let mut message_body = Vec::new();
    encode_tlv(TAG_INTEGER, &encode_integer(SNMP_VERSION_V2C), &mut message_body);
    encode_tlv(TAG_OCTET_STRING, community.as_bytes(), &mut message_body);
    message_body.extend(pdu);

    let mut message = Vec::new();
    encode_tlv(TAG_SEQUENCE, &message_body, &mut message);
    message
}

/// Encodes a GetRequest PDU carrying one or more OIDs (the composite GET
/// of spec.md §3, or a single-OID probe/confirm GET).
pub fn encode_get(community: &str, request_id: i64, oids: &[Oid]) -> Vec<u8> {
    encode_message(PDU_GET_REQUEST, community, request_id, 0, 0, oids)
}

/// Encodes a GetBulkRequest PDU, used for interface-table enumeration
/// (spec.md §6: non-repeaters 0, max-repetitions 60 by default).
pub fn encode_getbulk(community: &str, request_id: i64, non_repeaters: i64, max_repetitions: i64, oids: &[Oid]) -> Vec<u8> {
    encode_message(PDU_GET_BULK_REQUEST, community, request_id, non_repeaters, max_repetitions, oids)
}

#[allow(dead_code)]
pub fn encode_getnext(community: &str, request_id: i64, oids: &[Oid]) -> Vec<u8> {
    encode_message(PDU_GET_NEXT_REQUEST, community, request_id, 0, 0, oids)
}

// --- decoding -------------------------------------------------------------

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_byte(&mut self) -> Result<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| Error::Runtime("truncated SNMP message".into()))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::Runtime("truncated SNMP message".into()));
        }
        let s = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(s)
    }

    fn read_length(&mut self) -> Result<usize> {
        let first = self.read_byte()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let nbytes = (first & 0x7F) as usize;
        let bytes = self.read_slice(nbytes)?;
        let mut len = 0usize;
        for &b in bytes {
            len = (len << 8) | b as usize;
        }
        Ok(len)
    }

    /// Reads a tag + length, returning the tag byte and the content slice.
    fn read_tlv(&mut self) -> Result<(u8, &'a [u8])> {
        let tag = self.read_byte()?;
        let len = self.read_length()?;
        let content = self.read_slice(len)?;
        Ok((tag, content))
    }
}

fn decode_integer(bytes: &[u8]) -> i64 {
    if bytes.is_empty() {
        return 0;
    }
    let mut value: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in bytes {
        value = (value << 8) | b as i64;
    }
    value
}

fn decode_unsigned(bytes: &[u8]) -> u64 {
    let mut value: u64 = 0;
    for &b in bytes {
        value = (value << 8) | b as u64;
    }
    value
}

fn decode_oid(bytes: &[u8]) -> Oid {
    if bytes.is_empty() {
        return Vec::new();
    }
    let mut out = vec![(bytes[0] / 40) as u32, (bytes[0] % 40) as u32];
    let mut value: u32 = 0;
    for &b in &bytes[1..] {
        value = (value << 7) | (b & 0x7F) as u32;
        if b & 0x80 == 0 {
            out.push(value);
            value = 0;
        }
    }
    out
}

fn decode_value(tag: u8, content: &[u8]) -> Value {
    match tag {
        TAG_INTEGER => Value::Integer(decode_integer(content)),
        TAG_OCTET_STRING => Value::OctetString(content.to_vec()),
        TAG_OID => Value::ObjectId(decode_oid(content)),
        TAG_NULL => Value::Null,
        TAG_COUNTER32 => Value::Counter32(decode_unsigned(content) as u32),
        TAG_GAUGE32 => Value::Gauge32(decode_unsigned(content) as u32),
        TAG_TIMETICKS => Value::TimeTicks(decode_unsigned(content) as u32),
        TAG_COUNTER64 => Value::Counter64(decode_unsigned(content)),
        TAG_NO_SUCH_OBJECT => Value::NoSuchObject,
        TAG_NO_SUCH_INSTANCE => Value::NoSuchInstance,
        TAG_END_OF_MIB_VIEW => Value::EndOfMibView,
        _ => Value::Null,
    }
}

/// Decodes a GetResponse message body into its request id, error status,
/// error index, and variable bindings.
pub fn decode_response(message: &[u8]) -> Result<Response> {
    let mut cursor = Cursor::new(message);
    let (tag, seq_content) = cursor.read_tlv()?;
    if tag != TAG_SEQUENCE {
        return Err(Error::SnmpPacket {
            host: String::new(),
            detail: "not a SEQUENCE".into(),
        });
    }

    let mut body = Cursor::new(seq_content);
    let (_, _version) = body.read_tlv()?; // version, ignored
    let (_, _community) = body.read_tlv()?; // community, ignored on decode
    let (pdu_tag, pdu_content) = body.read_tlv()?;
    if pdu_tag != PDU_GET_RESPONSE {
        return Err(Error::SnmpPacket {
            host: String::new(),
            detail: format!("unexpected PDU tag {pdu_tag:#x}"),
        });
    }

    let mut pdu = Cursor::new(pdu_content);
    let (_, request_id_bytes) = pdu.read_tlv()?;
    let (_, error_status_bytes) = pdu.read_tlv()?;
    let (_, error_index_bytes) = pdu.read_tlv()?;
    let (_, varbind_seq) = pdu.read_tlv()?;

    let mut varbinds = Vec::new();
    let mut vb_cursor = Cursor::new(varbind_seq);
    while vb_cursor.remaining() > 0 {
        let (_, vb_content) = vb_cursor.read_tlv()?;
        let mut vb = Cursor::new(vb_content);
        let (oid_tag, oid_bytes) = vb.read_tlv()?;
        if oid_tag != TAG_OID {
            return Err(Error::InvalidData {
                host: String::new(),
                detail: "varbind name is not an OID".into(),
            });
        }
        let (val_tag, val_bytes) = vb.read_tlv()?;
        varbinds.push(VarBind {
            oid: decode_oid(oid_bytes),
            value: decode_value(val_tag, val_bytes),
        });
    }

    Ok(Response {
        request_id: decode_integer(request_id_bytes),
        error_status: decode_integer(error_status_bytes),
        error_index: decode_integer(error_index_bytes),
        varbinds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_round_trips() {
        let oid = vec![1, 3, 6, 1, 2, 1, 1, 2, 0];
        let encoded = encode_oid(&oid);
        assert_eq!(decode_oid(&encoded), oid);
    }

    #[test]
    fn get_request_has_sequence_framing() {
        let msg = encode_get("public", 1, &[vec![1, 3, 6, 1, 2, 1, 1, 2, 0]]);
        assert_eq!(msg[0], TAG_SEQUENCE);
    }

    #[test]
    fn integer_encoding_strips_redundant_bytes() {
        assert_eq!(encode_integer(0), vec![0]);
        assert_eq!(encode_integer(127), vec![127]);
        assert_eq!(encode_integer(128), vec![0, 128]);
        assert_eq!(encode_integer(-1), vec![0xFF]);
    }
}
