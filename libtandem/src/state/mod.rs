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

//! The object state codec.
//!
//! Every piece of state the coordinator persists passes through [`OutputObjectState`] on the way
//! to the store and [`InputObjectState`] on the way back. The format is a fixed 8-byte header
//! followed by type-tagged, big-endian values, each padded to a 4-byte boundary. Stored buffers
//! written by older releases remain readable as long as the header constants are unchanged.

mod format;
mod header;
mod input;
mod managed;
mod output;

pub use format::{ALIGNMENT, HEADER, HEADER_SIZE};
pub use header::StateHeader;
pub use input::InputObjectState;
pub use managed::{capture_state, load_committed, StateManaged};
pub use output::OutputObjectState;

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::error::CodecError;
    use crate::process::ProcessId;
    use crate::uid::Uid;

    use super::*;

    fn output() -> OutputObjectState {
        OutputObjectState::new(Uid::new(), "/Test")
    }

    #[test]
    fn primitives_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let uid = Uid::new();
        let mut os = output();
        os.pack_byte(0xab);
        os.pack_bytes(&[1, 2, 3, 4, 5])?;
        os.pack_bool(true);
        os.pack_char('λ');
        os.pack_short(-12);
        os.pack_int(i32::MIN);
        os.pack_long(i64::MAX);
        os.pack_float(1.5);
        os.pack_double(-2.25);
        os.pack_string(Some("hello"))?;
        os.pack_uid(&uid);

        let mut is = InputObjectState::from(&os);
        assert_eq!(is.unpack_byte()?, 0xab);
        assert_eq!(is.unpack_bytes()?, vec![1, 2, 3, 4, 5]);
        assert!(is.unpack_bool()?);
        assert_eq!(is.unpack_char()?, 'λ');
        assert_eq!(is.unpack_short()?, -12);
        assert_eq!(is.unpack_int()?, i32::MIN);
        assert_eq!(is.unpack_long()?, i64::MAX);
        assert_eq!(is.unpack_float()?, 1.5);
        assert_eq!(is.unpack_double()?, -2.25);
        assert_eq!(is.unpack_string()?.as_deref(), Some("hello"));
        assert_eq!(is.unpack_uid()?, uid);
        assert_eq!(is.remaining(), 0);

        Ok(())
    }

    #[test]
    fn null_and_empty_strings_are_distinguishable() -> Result<(), Box<dyn std::error::Error>> {
        let mut os = output();
        os.pack_string(None)?;
        os.pack_string(Some(""))?;

        let mut is = InputObjectState::from(os);
        assert_eq!(is.unpack_string()?, None);
        assert_eq!(is.unpack_string()?, Some(String::new()));

        Ok(())
    }

    #[test]
    fn header_is_fixed() {
        let os = output();
        assert_eq!(os.buffer(), &HEADER[..]);
        assert_eq!(&HEADER[..3], b"#BE");
        assert!(os.is_empty());
    }

    /// A failed read leaves the buffer unusable, even for reads which would otherwise succeed.
    #[test]
    fn failure_invalidates_buffer() {
        let mut os = output();
        os.pack_int(7);
        os.pack_int(8);

        let mut is = InputObjectState::from(&os);
        assert!(matches!(
            is.unpack_long(),
            Err(CodecError::TagMismatch { .. })
        ));
        assert!(!is.is_valid());

        is.rewind();
        assert_eq!(is.unpack_int(), Err(CodecError::BufferInvalid));
    }

    #[test]
    fn short_read_invalidates_buffer() {
        let mut os = output();
        os.pack_int(7);

        let mut bytes = os.into_buffer();
        bytes.truncate(HEADER_SIZE + 3);
        let mut is = InputObjectState::from_bytes(Uid::new(), "/Test", bytes).unwrap();

        assert!(matches!(
            is.unpack_int(),
            Err(CodecError::ShortRead { .. })
        ));
        assert_eq!(is.unpack_int(), Err(CodecError::BufferInvalid));
    }

    #[test]
    fn reading_past_the_end_fails() {
        let mut is = InputObjectState::from(output());
        assert!(is.unpack_bool().is_err());
        assert!(!is.is_valid());
    }

    #[test]
    fn bad_header_is_rejected() {
        assert!(matches!(
            InputObjectState::from_bytes(Uid::new(), "/Test", b"#XE\x01\x01\x00\x04\x00".to_vec()),
            Err(CodecError::BadHeader(_))
        ));
        assert!(InputObjectState::from_bytes(Uid::new(), "/Test", vec![]).is_err());
    }

    /// Padding which would run past the end of a truncated buffer is clamped rather than treated
    /// as a short read.
    #[test]
    fn trailing_padding_is_clamped() -> Result<(), CodecError> {
        let mut os = output();
        os.pack_bool(true);
        let mut bytes = os.into_buffer();
        bytes.truncate(HEADER_SIZE + 2);

        let mut is = InputObjectState::from_bytes(Uid::new(), "/Test", bytes)?;
        assert!(is.unpack_bool()?);
        assert_eq!(is.remaining(), 0);
        assert!(is.is_valid());
        Ok(())
    }

    #[test]
    fn copy_and_rewind_restart_reading() -> Result<(), CodecError> {
        let mut os = output();
        os.pack_int(1);
        os.pack_int(2);

        let mut is = InputObjectState::from(&os);
        assert_eq!(is.unpack_int()?, 1);

        let mut copy = is.copy();
        assert_eq!(copy.unpack_int()?, 1);
        assert_eq!(is.unpack_int()?, 2);

        is.rewind();
        assert_eq!(is.unpack_int()?, 1);

        os.rewind();
        assert!(os.is_empty());
        os.pack_int(3);
        let mut is = InputObjectState::from(os);
        assert_eq!(is.unpack_int()?, 3);
        Ok(())
    }

    #[test]
    fn nested_state_round_trips() -> Result<(), CodecError> {
        let inner_uid = Uid::new();
        let mut inner = OutputObjectState::new(inner_uid, "/Inner");
        inner.pack_string(Some("nested"))?;

        let mut outer = output();
        outer.pack_int(1);
        outer.pack_state(&inner)?;
        outer.pack_int(2);

        let mut is = InputObjectState::from(outer);
        assert_eq!(is.unpack_int()?, 1);
        let mut nested = is.unpack_state()?;
        assert_eq!(is.unpack_int()?, 2);

        assert_eq!(*nested.uid(), inner_uid);
        assert_eq!(nested.type_name(), "/Inner");
        assert_eq!(nested.unpack_string()?.as_deref(), Some("nested"));
        Ok(())
    }

    #[test]
    fn state_header_wraps_body() -> Result<(), CodecError> {
        let action = Uid::new();
        let process = ProcessId::from_raw(99);
        let mut body = output();
        body.pack_long(17);

        let wrapped = StateHeader::new(action, process).wrap(&body)?;
        assert_eq!(wrapped.uid(), body.uid());

        let mut stored = InputObjectState::from(wrapped);
        let (header, mut unwrapped) = StateHeader::unwrap(&mut stored)?;
        assert_eq!(header.action, action);
        assert_eq!(header.process, process);
        assert_eq!(unwrapped.unpack_long()?, 17);
        Ok(())
    }

    #[derive(Debug, Clone)]
    enum Value {
        Byte(u8),
        Bytes(Vec<u8>),
        Bool(bool),
        Char(char),
        Short(i16),
        Int(i32),
        Long(i64),
        Str(Option<String>),
    }

    fn value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<u8>().prop_map(Value::Byte),
            proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
            any::<bool>().prop_map(Value::Bool),
            any::<char>().prop_map(Value::Char),
            any::<i16>().prop_map(Value::Short),
            any::<i32>().prop_map(Value::Int),
            any::<i64>().prop_map(Value::Long),
            proptest::option::of(".{0,12}").prop_map(Value::Str),
        ]
    }

    proptest! {
        /// The packed length after the header is always a multiple of the alignment, and every
        /// value reads back as written.
        #[test]
        fn packed_values_stay_aligned(values in proptest::collection::vec(value(), 0..24)) {
            let mut os = output();
            for value in &values {
                match value {
                    Value::Byte(v) => os.pack_byte(*v),
                    Value::Bytes(v) => os.pack_bytes(v).unwrap(),
                    Value::Bool(v) => os.pack_bool(*v),
                    Value::Char(v) => os.pack_char(*v),
                    Value::Short(v) => os.pack_short(*v),
                    Value::Int(v) => os.pack_int(*v),
                    Value::Long(v) => os.pack_long(*v),
                    Value::Str(v) => os.pack_string(v.as_deref()).unwrap(),
                }
                prop_assert_eq!((os.len() - HEADER_SIZE) % ALIGNMENT, 0);
            }

            let mut is = InputObjectState::from(os);
            for value in &values {
                match value {
                    Value::Byte(v) => prop_assert_eq!(is.unpack_byte().unwrap(), *v),
                    Value::Bytes(v) => prop_assert_eq!(&is.unpack_bytes().unwrap(), v),
                    Value::Bool(v) => prop_assert_eq!(is.unpack_bool().unwrap(), *v),
                    Value::Char(v) => prop_assert_eq!(is.unpack_char().unwrap(), *v),
                    Value::Short(v) => prop_assert_eq!(is.unpack_short().unwrap(), *v),
                    Value::Int(v) => prop_assert_eq!(is.unpack_int().unwrap(), *v),
                    Value::Long(v) => prop_assert_eq!(is.unpack_long().unwrap(), *v),
                    Value::Str(v) => prop_assert_eq!(&is.unpack_string().unwrap(), v),
                }
            }
            prop_assert_eq!(is.remaining(), 0);
        }

        #[test]
        fn doubles_round_trip(v in any::<f64>()) {
            let mut os = output();
            os.pack_double(v);
            let mut is = InputObjectState::from(os);
            prop_assert_eq!(is.unpack_double().unwrap().to_bits(), v.to_bits());
        }
    }
}
