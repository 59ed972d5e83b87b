//! Binary codec for chat protocol frames.
//!
//! Wire format:
//! ```text
//! [type:1][length:4][payload:length]
//! ```
//! The length is big-endian and capped at [`MAX_PAYLOAD_LEN`]. Payloads are
//! fixed layouts of NUL-terminated character fields, except the user list
//! (see [`crate::roster`]).

use std::io::{self, Read, Write};

use tracing::debug;

use crate::error::ProtocolError;
use crate::message::{Message, MessageType, StatusCode};
use crate::roster::Roster;
use crate::types::{MAX_MESSAGE_LEN, MAX_PASSWORD_LEN, MAX_USERNAME_LEN};

/// Size of the frame header
pub const HEADER_SIZE: usize = 5;

/// Largest payload either side will send or accept (1 MiB)
pub const MAX_PAYLOAD_LEN: usize = 1024 * 1024;

/// `NicknameRequest`: one nickname field
pub const NICKNAME_REQUEST_SIZE: usize = MAX_USERNAME_LEN;
/// Nickname/register/login responses: status byte and one text field
pub const RESPONSE_SIZE: usize = 1 + MAX_MESSAGE_LEN;
/// `ChatMessage`: username field and text field
pub const CHAT_SIZE: usize = MAX_USERNAME_LEN + MAX_MESSAGE_LEN;
/// `UserNotification`: one username field
pub const USER_NOTIFICATION_SIZE: usize = MAX_USERNAME_LEN;
/// Register/login requests: username field and password field
pub const CREDENTIALS_SIZE: usize = MAX_USERNAME_LEN + MAX_PASSWORD_LEN;

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw type tag, kept raw so unknown tags can still be skipped
    pub tag: u8,
    pub length: usize,
}

impl FrameHeader {
    pub fn message_type(&self) -> Result<MessageType, ProtocolError> {
        MessageType::try_from(self.tag)
    }
}

// ── Frame encoding ───────────────────────────────────────────────────────────

/// Encodes a [`Message`] into a complete frame.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if the payload exceeds the cap.
pub fn encode(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    encode_frame(msg.message_type() as u8, &encode_payload(msg))
}

/// Frames an already-encoded payload.
pub fn encode_frame(tag: u8, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            length: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.push(tag);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Serializes the payload of `msg` into its fixed layout.
///
/// The buffer is zero-filled before fields are written, so bytes past each
/// string's terminator are always zero.
pub fn encode_payload(msg: &Message) -> Vec<u8> {
    match msg {
        Message::NicknameRequest { nickname } => {
            let mut buf = vec![0u8; NICKNAME_REQUEST_SIZE];
            put_field(&mut buf, nickname);
            buf
        }
        Message::NicknameResponse { status, message }
        | Message::RegisterResponse { status, message }
        | Message::LoginResponse { status, message } => {
            let mut buf = vec![0u8; RESPONSE_SIZE];
            buf[0] = *status as u8;
            put_field(&mut buf[1..], message);
            buf
        }
        Message::Chat { username, message } => {
            let mut buf = vec![0u8; CHAT_SIZE];
            put_field(&mut buf[..MAX_USERNAME_LEN], username);
            put_field(&mut buf[MAX_USERNAME_LEN..], message);
            buf
        }
        Message::UserJoin { username } | Message::UserLeave { username } => {
            let mut buf = vec![0u8; USER_NOTIFICATION_SIZE];
            put_field(&mut buf, username);
            buf
        }
        Message::UserList(roster) => roster.encode(),
        Message::Disconnect => Vec::new(),
        Message::Register { username, password } | Message::Login { username, password } => {
            let mut buf = vec![0u8; CREDENTIALS_SIZE];
            put_field(&mut buf[..MAX_USERNAME_LEN], username);
            put_field(&mut buf[MAX_USERNAME_LEN..], password);
            buf
        }
    }
}

// ── Frame decoding ───────────────────────────────────────────────────────────

/// Parses a frame header.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] for a declared length above the cap.
pub fn decode_header(bytes: &[u8; HEADER_SIZE]) -> Result<FrameHeader, ProtocolError> {
    let length = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    if length > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            length,
            max: MAX_PAYLOAD_LEN,
        });
    }
    Ok(FrameHeader {
        tag: bytes[0],
        length,
    })
}

/// Decodes one [`Message`] from the beginning of `bytes`.
///
/// Returns the message and the number of bytes consumed (header + payload).
pub fn decode(bytes: &[u8]) -> Result<(Message, usize), ProtocolError> {
    let header_bytes: &[u8; HEADER_SIZE] = bytes
        .get(..HEADER_SIZE)
        .and_then(|h| h.try_into().ok())
        .ok_or(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        })?;
    let header = decode_header(header_bytes)?;

    let total = HEADER_SIZE + header.length;
    let payload = bytes
        .get(HEADER_SIZE..total)
        .ok_or(ProtocolError::InsufficientData {
            needed: total,
            available: bytes.len(),
        })?;
    let msg = decode_payload(header.tag, payload)?;
    Ok((msg, total))
}

/// Decodes a payload of the given type tag.
///
/// Fixed layouts shorter than their size are rejected; trailing bytes beyond
/// the layout are ignored. Text fields are forced to end at their last byte.
pub fn decode_payload(tag: u8, payload: &[u8]) -> Result<Message, ProtocolError> {
    let msg_type = MessageType::try_from(tag)?;
    let msg = match msg_type {
        MessageType::Nickname => {
            let p = fixed(msg_type, payload, NICKNAME_REQUEST_SIZE)?;
            Message::NicknameRequest {
                nickname: get_field(p),
            }
        }
        MessageType::NicknameResponse => {
            let (status, message) = response_fields(msg_type, payload)?;
            Message::NicknameResponse { status, message }
        }
        MessageType::RegisterResponse => {
            let (status, message) = response_fields(msg_type, payload)?;
            Message::RegisterResponse { status, message }
        }
        MessageType::LoginResponse => {
            let (status, message) = response_fields(msg_type, payload)?;
            Message::LoginResponse { status, message }
        }
        MessageType::Chat => {
            let p = fixed(msg_type, payload, CHAT_SIZE)?;
            Message::Chat {
                username: get_field(&p[..MAX_USERNAME_LEN]),
                message: get_field(&p[MAX_USERNAME_LEN..]),
            }
        }
        MessageType::UserJoin => Message::UserJoin {
            username: get_field(fixed(msg_type, payload, USER_NOTIFICATION_SIZE)?),
        },
        MessageType::UserLeave => Message::UserLeave {
            username: get_field(fixed(msg_type, payload, USER_NOTIFICATION_SIZE)?),
        },
        MessageType::UserList => Message::UserList(Roster::decode(payload)?),
        MessageType::Disconnect => Message::Disconnect,
        MessageType::Register => {
            let p = fixed(msg_type, payload, CREDENTIALS_SIZE)?;
            Message::Register {
                username: get_field(&p[..MAX_USERNAME_LEN]),
                password: get_field(&p[MAX_USERNAME_LEN..]),
            }
        }
        MessageType::Login => {
            let p = fixed(msg_type, payload, CREDENTIALS_SIZE)?;
            Message::Login {
                username: get_field(&p[..MAX_USERNAME_LEN]),
                password: get_field(&p[MAX_USERNAME_LEN..]),
            }
        }
    };
    Ok(msg)
}

// ── Stream I/O ───────────────────────────────────────────────────────────────

/// Encodes `msg` and writes it with a single `write_all`.
///
/// Returns the number of bytes written.
pub fn write_message<W: Write>(writer: &mut W, msg: &Message) -> Result<usize, ProtocolError> {
    let frame = encode(msg)?;
    writer.write_all(&frame)?;
    debug!(
        "Sent {:?} frame ({} payload bytes)",
        msg.message_type(),
        frame.len() - HEADER_SIZE
    );
    Ok(frame.len())
}

/// Reads one frame header.
///
/// A zero-byte read before the first header byte is
/// [`ProtocolError::ConnectionClosed`]; a receive timeout at that point is
/// returned as an I/O error so callers can poll for shutdown. Once a frame
/// has started, timeouts are retried until the header is complete.
pub fn read_header<R: Read>(reader: &mut R) -> Result<FrameHeader, ProtocolError> {
    let mut bytes = [0u8; HEADER_SIZE];
    read_full(reader, &mut bytes, true)?;
    decode_header(&bytes)
}

/// Reads exactly `length` payload bytes.
pub fn read_payload<R: Read>(reader: &mut R, length: usize) -> Result<Vec<u8>, ProtocolError> {
    if length > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            length,
            max: MAX_PAYLOAD_LEN,
        });
    }
    let mut payload = vec![0u8; length];
    read_full(reader, &mut payload, false)?;
    Ok(payload)
}

/// Reads and drops exactly `length` bytes, keeping the stream aligned on
/// the next frame.
pub fn discard_payload<R: Read>(reader: &mut R, length: usize) -> Result<(), ProtocolError> {
    let mut scratch = [0u8; 1024];
    let mut remaining = length;
    while remaining > 0 {
        let chunk = remaining.min(scratch.len());
        read_full(reader, &mut scratch[..chunk], false)?;
        remaining -= chunk;
    }
    Ok(())
}

/// Reads one complete frame and decodes it.
///
/// Returns the raw header alongside the decode result so callers can log and
/// skip a malformed payload without losing framing.
pub fn read_message<R: Read>(
    reader: &mut R,
) -> Result<(FrameHeader, Result<Message, ProtocolError>), ProtocolError> {
    let header = read_header(reader)?;
    let payload = read_payload(reader, header.length)?;
    Ok((header, decode_payload(header.tag, &payload)))
}

fn read_full<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    frame_start: bool,
) -> Result<(), ProtocolError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Err(ProtocolError::ConnectionClosed),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
                    && !(frame_start && filled == 0) => {}
            Err(e) => return Err(ProtocolError::Io(e)),
        }
    }
    Ok(())
}

// ── Field helpers ────────────────────────────────────────────────────────────

/// Writes `value` into a zeroed field, truncating at a char boundary so the
/// last byte stays a terminator.
fn put_field(field: &mut [u8], value: &str) {
    let limit = field.len().saturating_sub(1);
    let mut end = value.len().min(limit);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    field[..end].copy_from_slice(&value.as_bytes()[..end]);
}

/// Reads a field up to its first NUL, treating the last byte as a NUL
/// whatever it holds.
fn get_field(field: &[u8]) -> String {
    let usable = &field[..field.len().saturating_sub(1)];
    let end = usable.iter().position(|b| *b == 0).unwrap_or(usable.len());
    String::from_utf8_lossy(&usable[..end]).into_owned()
}

fn fixed(msg_type: MessageType, payload: &[u8], size: usize) -> Result<&[u8], ProtocolError> {
    payload.get(..size).ok_or_else(|| {
        ProtocolError::MalformedPayload(format!(
            "{:?} payload is {} bytes, layout needs {}",
            msg_type,
            payload.len(),
            size
        ))
    })
}

fn response_fields(
    msg_type: MessageType,
    payload: &[u8],
) -> Result<(StatusCode, String), ProtocolError> {
    let p = fixed(msg_type, payload, RESPONSE_SIZE)?;
    Ok((StatusCode::try_from(p[0])?, get_field(&p[1..])))
}
