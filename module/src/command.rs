//! Command identifiers, parameter shapes, and status codes of the host-facing surface.
//!
//! The host invokes the module with a command identifier and exactly four parameter slots. Each
//! command expects a fixed shape:
//!
//! | command | slot 0 | slot 1 | slot 2 | slot 3 |
//! |---|---|---|---|---|
//! | `SET_KEY` | input: header | input: wrapped key | input: tag | none |
//! | `ATTEST` | input: challenge | output: tag (>= 16 bytes) | none | none |
//! | `HANDLE_INPUT` | value: connection id | input: ciphertext | input: tag | none |
//! | `ENTRY` | none | none | none | none |
//!
//! Any other shape is rejected with [status::BAD_PARAMETERS] before any state is touched.

use crate::{provisioning::WrappedKey, Error};
use bytes::Bytes;
use trustlet_cryptography::TAG_LENGTH;

/// Status codes returned to the host.
pub mod status {
    pub const SUCCESS: u32 = 0x0000_0000;
    pub const GENERIC: u32 = 0xFFFF_0000;
    pub const ACCESS_CONFLICT: u32 = 0xFFFF_0003;
    pub const BAD_PARAMETERS: u32 = 0xFFFF_0006;
    pub const BAD_STATE: u32 = 0xFFFF_0007;
    pub const ITEM_NOT_FOUND: u32 = 0xFFFF_0008;
    pub const NOT_SUPPORTED: u32 = 0xFFFF_000A;
    pub const COMMUNICATION: u32 = 0xFFFF_000E;
    pub const OVERFLOW: u32 = 0xFFFF_300F;
    pub const MAC_INVALID: u32 = 0xFFFF_3071;
}

/// Number of parameter slots in every invocation.
pub const PARAM_SLOTS: usize = 4;

/// Commands accepted by the module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    /// Provision a connection from a wrapped session key.
    SetKey = 0,
    /// Answer an attestation challenge.
    Attest = 1,
    /// Dispatch an authenticated command.
    HandleInput = 2,
    /// Reserved entry point that does nothing.
    Entry = 3,
}

impl TryFrom<u32> for Command {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::SetKey),
            1 => Ok(Self::Attest),
            2 => Ok(Self::HandleInput),
            3 => Ok(Self::Entry),
            other => Err(Error::UnsupportedCommand(other)),
        }
    }
}

/// One parameter slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Param {
    #[default]
    None,
    /// A pair of integers passed by value.
    Value(u32, u32),
    /// A buffer read by the module.
    Input(Bytes),
    /// A buffer written by the module, with its capacity in bytes.
    Output(usize),
}

/// The parameter slots of one invocation.
pub type Params = [Param; PARAM_SLOTS];

/// A command whose parameters have the expected shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    SetKey(WrappedKey),
    Attest { challenge: Bytes },
    HandleInput {
        connection_id: u16,
        ciphertext: Bytes,
        tag: Bytes,
    },
    Entry,
}

impl Request {
    /// Check `params` against the shape expected by `command`.
    pub fn parse(command: Command, params: Params) -> Result<Self, Error> {
        match (command, params) {
            (
                Command::SetKey,
                [Param::Input(header), Param::Input(ciphertext), Param::Input(tag), Param::None],
            ) => Ok(Self::SetKey(WrappedKey::new(header, ciphertext, tag))),
            (
                Command::Attest,
                [Param::Input(challenge), Param::Output(capacity), Param::None, Param::None],
            ) => {
                if capacity < TAG_LENGTH {
                    return Err(Error::MalformedMessage("output buffer too small"));
                }
                Ok(Self::Attest { challenge })
            }
            (
                Command::HandleInput,
                [
                    Param::Value(connection_id, _),
                    Param::Input(ciphertext),
                    Param::Input(tag),
                    Param::None,
                ],
            ) => {
                let connection_id = u16::try_from(connection_id)
                    .map_err(|_| Error::MalformedMessage("connection id out of range"))?;
                Ok(Self::HandleInput {
                    connection_id,
                    ciphertext,
                    tag,
                })
            }
            (Command::Entry, [Param::None, Param::None, Param::None, Param::None]) => {
                Ok(Self::Entry)
            }
            _ => Err(Error::MalformedMessage("unexpected parameter types")),
        }
    }
}

/// The result of a successful invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Empty,
    /// Bytes written to the output slot.
    Output(Bytes),
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn input(data: &'static [u8]) -> Param {
        Param::Input(Bytes::from_static(data))
    }

    #[test_case(0, Command::SetKey; "set key")]
    #[test_case(1, Command::Attest; "attest")]
    #[test_case(2, Command::HandleInput; "handle input")]
    #[test_case(3, Command::Entry; "entry")]
    fn test_command_ids(id: u32, expected: Command) {
        assert_eq!(Command::try_from(id), Ok(expected));
        assert_eq!(expected as u32, id);
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(Command::try_from(4), Err(Error::UnsupportedCommand(4)));
        assert_eq!(
            Command::try_from(u32::MAX),
            Err(Error::UnsupportedCommand(u32::MAX))
        );
    }

    #[test]
    fn test_parse_set_key() {
        let request = Request::parse(
            Command::SetKey,
            [input(b"hdr"), input(b"key"), input(b"tag"), Param::None],
        )
        .unwrap();
        let Request::SetKey(wrapped) = request else {
            panic!("unexpected request");
        };
        assert_eq!(&wrapped.header[..], b"hdr");
        assert_eq!(&wrapped.ciphertext[..], b"key");
        assert_eq!(&wrapped.tag[..], b"tag");
    }

    #[test]
    fn test_parse_attest() {
        let request = Request::parse(
            Command::Attest,
            [input(b"nonce"), Param::Output(16), Param::None, Param::None],
        )
        .unwrap();
        assert_eq!(
            request,
            Request::Attest {
                challenge: Bytes::from_static(b"nonce")
            }
        );

        assert_eq!(
            Request::parse(
                Command::Attest,
                [input(b"nonce"), Param::Output(15), Param::None, Param::None],
            ),
            Err(Error::MalformedMessage("output buffer too small"))
        );
    }

    #[test]
    fn test_parse_handle_input() {
        let request = Request::parse(
            Command::HandleInput,
            [Param::Value(7, 0), input(b"ct"), input(b"tag"), Param::None],
        )
        .unwrap();
        assert_eq!(
            request,
            Request::HandleInput {
                connection_id: 7,
                ciphertext: Bytes::from_static(b"ct"),
                tag: Bytes::from_static(b"tag"),
            }
        );

        assert_eq!(
            Request::parse(
                Command::HandleInput,
                [
                    Param::Value(0x1_0000, 0),
                    input(b"ct"),
                    input(b"tag"),
                    Param::None,
                ],
            ),
            Err(Error::MalformedMessage("connection id out of range"))
        );
    }

    #[test]
    fn test_parse_wrong_shape() {
        let cases = [
            (
                Command::SetKey,
                [input(b"hdr"), input(b"key"), Param::None, Param::None],
            ),
            (
                Command::SetKey,
                [input(b"hdr"), input(b"key"), input(b"tag"), input(b"x")],
            ),
            (
                Command::Attest,
                [input(b"nonce"), input(b"out"), Param::None, Param::None],
            ),
            (
                Command::HandleInput,
                [input(b"7"), input(b"ct"), input(b"tag"), Param::None],
            ),
            (
                Command::Entry,
                [Param::Value(0, 0), Param::None, Param::None, Param::None],
            ),
        ];
        for (command, params) in cases {
            assert_eq!(
                Request::parse(command, params),
                Err(Error::MalformedMessage("unexpected parameter types"))
            );
        }
    }
}
