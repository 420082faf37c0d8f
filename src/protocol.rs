//! The ASCII command protocol.
//!
//! A request is framed as `STX`, the command code with the first argument
//! glued to it, the remaining arguments separated by `/`, then `\r\n`:
//!
//! ```
//! # use kzproto::protocol::{Codec, Variant, command::MOVE_FREE};
//! let codec = Codec::new(Variant::Default);
//! let frame = codec.encode(MOVE_FREE, &[("ax_num", 1), ("vel_no", 2), ("dir", 1)])?;
//! assert_eq!(frame, b"\x02FRP1/2/1\r\n");
//! # Ok::<(), kzproto::error::CodecError>(())
//! ```
//!
//! Replies are whitespace separated text starting with `C` (success) or `E`
//! (error), optionally followed by the echoed command code, then the fields of
//! the reply. Fields are usually positional, but the labelled form
//! (`C ax_num 1 status 0`) emitted by older firmware is accepted too.

pub mod command;
mod reply;

pub use command::{CommandSpec, Variant};
pub use reply::Reply;

use crate::error::{
    CodecError, DeviceCommandError, MalformedResponseError, ResponseLengthMismatchError,
    UnknownCommandError,
};

/// The byte that starts every request frame.
pub const STX: u8 = 0x02;
/// The bytes that end every request frame and reply line.
pub const CRLF: &[u8] = b"\r\n";

/// Encodes commands and decodes replies using a variant's command table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Codec {
    variant: Variant,
}

impl Codec {
    /// Create a codec for the given variant.
    pub const fn new(variant: Variant) -> Self {
        Codec { variant }
    }

    /// The variant whose table this codec uses.
    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Look up a command in the active table.
    pub fn spec(&self, command: &str) -> Result<&'static CommandSpec, UnknownCommandError> {
        self.variant
            .command(command)
            .ok_or_else(|| UnknownCommandError::new(command, self.variant))
    }

    /// Encode a command into a request frame.
    ///
    /// Only arguments the command declares are serialized, in the order the
    /// command declares them. Declared arguments that are not supplied are
    /// skipped, as are supplied arguments the command does not declare.
    pub fn encode(&self, command: &str, args: &[(&str, i64)]) -> Result<Vec<u8>, CodecError> {
        let spec = self.spec(command)?;
        let values: Vec<String> = spec
            .args()
            .iter()
            .filter_map(|name| {
                args.iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.to_string())
            })
            .collect();

        let mut frame = Vec::with_capacity(3 + spec.code().len() + values.len() * 6);
        frame.push(STX);
        frame.extend_from_slice(spec.code().as_bytes());
        frame.extend_from_slice(values.join("/").as_bytes());
        frame.extend_from_slice(CRLF);
        Ok(frame)
    }

    /// Decode a reply line for the given command.
    ///
    /// A success reply yields its fields. An error reply is returned as a
    /// [`DeviceCommandError`] carrying the axis (if reported) and the
    /// device's error code.
    pub fn decode(&self, raw: &str, command: &str) -> Result<Reply, CodecError> {
        let spec = self.spec(command)?;
        let text = raw.trim_matches(|c: char| c.is_whitespace() || c.is_control());
        let mut tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(MalformedResponseError::new(command, raw, "empty reply").into());
        }

        let success = match tokens.remove(0) {
            "C" => true,
            "E" => false,
            other => {
                return Err(MalformedResponseError::new(
                    command,
                    text,
                    format!("unexpected result prefix '{other}'"),
                )
                .into())
            }
        };

        // Drop the echoed command code. A fused suffix is the first field.
        if let Some(first) = tokens.first().copied() {
            if first == spec.code() {
                tokens.remove(0);
            } else if let Some(suffix) = first.strip_prefix(spec.code()) {
                if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) {
                    tokens[0] = suffix;
                }
            }
        }

        let layouts = if success {
            spec.reply_layouts()
        } else {
            spec.error_layouts()
        };
        let fields = match_labelled(layouts, &tokens)
            .or_else(|| match_positional(layouts, &tokens))
            .ok_or_else(|| {
                ResponseLengthMismatchError::new(
                    command,
                    text,
                    layouts.iter().map(|layout| layout.len()).collect(),
                    tokens.len(),
                )
            })?;

        let reply = Reply::new(command, text, fields);
        if success {
            Ok(reply)
        } else {
            Err(DeviceCommandError::new(
                command,
                reply.get("ax_num").map(str::to_string),
                reply.get("error_num").unwrap_or_default().to_string(),
            )
            .into())
        }
    }
}

/// Match the tokens against the first layout of the same length.
fn match_positional(
    layouts: &[&'static [&'static str]],
    tokens: &[&str],
) -> Option<Vec<(String, String)>> {
    let layout = layouts.iter().find(|layout| layout.len() == tokens.len())?;
    Some(
        layout
            .iter()
            .zip(tokens)
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect(),
    )
}

/// Match `name value` pairs whose names all belong to a single layout.
///
/// Field names never appear as values, so a reply whose every other token is
/// a field name is taken to be labelled.
fn match_labelled(
    layouts: &[&'static [&'static str]],
    tokens: &[&str],
) -> Option<Vec<(String, String)>> {
    if tokens.is_empty() || tokens.len() % 2 != 0 {
        return None;
    }
    let pairs: Vec<(&str, &str)> = tokens.chunks(2).map(|pair| (pair[0], pair[1])).collect();
    for (i, (name, _)) in pairs.iter().enumerate() {
        if pairs[..i].iter().any(|(seen, _)| seen == name) {
            return None;
        }
    }
    layouts
        .iter()
        .find(|layout| {
            pairs
                .iter()
                .all(|(name, _)| layout.iter().any(|field| field == name))
        })
        .map(|_| {
            pairs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect()
        })
}
