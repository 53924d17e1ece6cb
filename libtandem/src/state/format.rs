// Copyright 2023 Bitwise IO, Inc.
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

//! Constants of the binary object state format.

/// Values are padded so that each one starts on a multiple of this many bytes.
pub const ALIGNMENT: usize = 4;

pub const HEADER_SIZE: usize = 8;

const MAGIC: [u8; 3] = *b"#BE";
const BIG_ENDIAN: u8 = 1;
const VERSION_MAJOR: u8 = 1;
const VERSION_MINOR: u8 = 0;

/// The fixed header which starts every buffer: magic, byte-order flag, major and minor version,
/// alignment and a reserved byte.
pub const HEADER: [u8; HEADER_SIZE] = [
    MAGIC[0],
    MAGIC[1],
    MAGIC[2],
    BIG_ENDIAN,
    VERSION_MAJOR,
    VERSION_MINOR,
    ALIGNMENT as u8,
    0,
];

/// Checks the header of a stored buffer, returning a description of the problem if it cannot be
/// read by this implementation.
pub fn check_header(bytes: &[u8]) -> Result<(), String> {
    if bytes.len() < HEADER_SIZE {
        return Err(format!("buffer of {} bytes has no header", bytes.len()));
    }
    if bytes[..3] != MAGIC {
        return Err("magic does not match".into());
    }
    if bytes[3] != BIG_ENDIAN {
        return Err(format!("unsupported byte order flag {}", bytes[3]));
    }
    if bytes[4] != VERSION_MAJOR {
        return Err(format!("unsupported major version {}", bytes[4]));
    }
    if bytes[6] as usize != ALIGNMENT {
        return Err(format!("unsupported alignment {}", bytes[6]));
    }
    Ok(())
}

/// Number of padding bytes needed after `offset` to reach the next aligned position.
pub fn padding(offset: usize) -> usize {
    (ALIGNMENT - offset % ALIGNMENT) % ALIGNMENT
}

/// The type tag written before every packed value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueTag {
    Byte = 1,
    Bytes = 2,
    Bool = 3,
    Char = 4,
    Short = 5,
    Int = 6,
    Long = 7,
    Float = 8,
    Double = 9,
    String = 10,
    State = 11,
    Uid = 12,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_accepted() {
        assert!(check_header(&HEADER).is_ok());
        assert!(check_header(&HEADER[..4]).is_err());

        let mut bad = HEADER;
        bad[0] = b'X';
        assert!(check_header(&bad).is_err());

        let mut bad = HEADER;
        bad[6] = 8;
        assert!(check_header(&bad).is_err());
    }

    #[test]
    fn padding_reaches_alignment() {
        assert_eq!(padding(8), 0);
        assert_eq!(padding(9), 3);
        assert_eq!(padding(10), 2);
        assert_eq!(padding(11), 1);
    }
}
