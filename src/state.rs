//! Save-state serialization.
//!
//! Every stateful component implements [`StateComponent`]; the top level
//! save-state (see `gba::GbaCore::save_state`/`load_state`) concatenates
//! each component's bytes behind the versioned header described in the
//! external interfaces.

use gba_core_common::{
    data::{read_u32, write_u32},
    error::Error,
};
use std::io::Cursor;

/// Reserved for future on-disk variants (compressed, delta, ...); currently
/// every component is serialized the same way regardless of format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFormat {
    Standard,
}

pub trait StateComponent {
    fn state(&self, format: Option<StateFormat>) -> Result<Vec<u8>, Error>;
    fn set_state(&mut self, data: &[u8], format: Option<StateFormat>) -> Result<(), Error>;
}

pub const SAVE_STATE_MAGIC: u32 = 0x4545_4d45; // ASCII "EMER", read little-endian
pub const SAVE_STATE_VERSION: u32 = 1;

/// Versioned, whole-machine save-state record.
///
/// Layout on disk: `magic, version, frame_count`, then each component's
/// [`StateComponent::state`] blob length-prefixed with a `u32`, in the
/// fixed order `cpu, bus, interrupts, timers, dma, cartridge`. ROM bytes
/// are never persisted.
pub struct SaveState {
    pub frame_count: u64,
    pub blobs: Vec<Vec<u8>>,
}

impl SaveState {
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        write_u32(&mut out, SAVE_STATE_MAGIC)?;
        write_u32(&mut out, SAVE_STATE_VERSION)?;
        out.extend_from_slice(&self.frame_count.to_le_bytes());
        for blob in &self.blobs {
            write_u32(&mut out, blob.len() as u32)?;
            out.extend_from_slice(blob);
        }
        Ok(out)
    }

    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        if data.len() < 16 {
            return Err(Error::CustomError(String::from("save-state too short")));
        }
        let mut cursor = Cursor::new(data);
        let magic = read_u32(&mut cursor)?;
        if magic != SAVE_STATE_MAGIC {
            return Err(Error::CustomError(String::from("save-state bad magic")));
        }
        let version = read_u32(&mut cursor)?;
        if version != SAVE_STATE_VERSION {
            return Err(Error::CustomError(String::from(
                "save-state unsupported version",
            )));
        }
        let pos = cursor.position() as usize;
        let frame_count = u64::from_le_bytes(
            data[pos..pos + 8]
                .try_into()
                .map_err(|_| Error::InvalidData)?,
        );
        cursor.set_position((pos + 8) as u64);

        let mut blobs = Vec::new();
        loop {
            let pos = cursor.position() as usize;
            if pos >= data.len() {
                break;
            }
            let len = read_u32(&mut cursor)? as usize;
            let start = cursor.position() as usize;
            let end = start + len;
            let blob = data
                .get(start..end)
                .ok_or(Error::CustomError(String::from("save-state truncated")))?
                .to_vec();
            cursor.set_position(end as u64);
            blobs.push(blob);
        }

        Ok(Self {
            frame_count,
            blobs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::SaveState;

    #[test]
    fn test_round_trip() {
        let state = SaveState {
            frame_count: 42,
            blobs: vec![vec![1, 2, 3], vec![], vec![9; 16]],
        };
        let encoded = state.encode().unwrap();
        let decoded = SaveState::decode(&encoded).unwrap();
        assert_eq!(decoded.frame_count, 42);
        assert_eq!(decoded.blobs, state.blobs);
    }

    #[test]
    fn test_bad_magic_is_clean_failure() {
        let mut bytes = SaveState {
            frame_count: 0,
            blobs: vec![],
        }
        .encode()
        .unwrap();
        bytes[0] = 0x00;
        assert!(SaveState::decode(&bytes).is_err());
    }

    #[test]
    fn test_short_input_is_clean_failure() {
        assert!(SaveState::decode(&[1, 2, 3]).is_err());
    }
}
