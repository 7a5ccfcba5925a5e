// traci/codec.rs
//
// Byte-level framing for SUMO's TraCI protocol. All integers are big-endian.
// A message is an i32 total length (including itself) followed by commands.
// A command is a u8 length (or 0 followed by an i32 length when it does not
// fit in a byte), the command id and its payload.

use crate::error::{Result, TlcsError};

pub const CMD_GETVERSION: u8 = 0x00;
pub const CMD_SIMSTEP: u8 = 0x02;
pub const CMD_CLOSE: u8 = 0x7F;
pub const CMD_GET_LANE_VARIABLE: u8 = 0xa3;
pub const CMD_GET_VEHICLE_VARIABLE: u8 = 0xa4;
pub const CMD_GET_EDGE_VARIABLE: u8 = 0xaa;
pub const CMD_SET_TL_VARIABLE: u8 = 0xc2;

/// Get responses echo the command id shifted by this amount.
pub const RESPONSE_OFFSET: u8 = 0x10;

pub const ID_LIST: u8 = 0x00;
pub const LAST_STEP_VEHICLE_NUMBER: u8 = 0x10;
pub const LAST_STEP_VEHICLE_HALTING_NUMBER: u8 = 0x14;
pub const TL_PHASE_INDEX: u8 = 0x22;
pub const VAR_ACCUMULATED_WAITING_TIME: u8 = 0x87;

pub const TYPE_UBYTE: u8 = 0x07;
pub const TYPE_INTEGER: u8 = 0x09;
pub const TYPE_DOUBLE: u8 = 0x0B;
pub const TYPE_STRING: u8 = 0x0C;
pub const TYPE_STRINGLIST: u8 = 0x0E;

pub const RTYPE_OK: u8 = 0x00;

/// Growable big-endian write buffer.
#[derive(Debug, Clone, Default)]
pub struct Storage {
    buf: Vec<u8>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn write_f64(&mut self, value: f64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn write_string(&mut self, value: &str) -> &mut Self {
        self.write_i32(value.len() as i32);
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a received message body.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(TlcsError::Protocol(format!(
                "truncated message: wanted {} bytes, {} left",
                n,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(i32::from_be_bytes(bytes))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(f64::from_be_bytes(bytes))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(TlcsError::Protocol(format!("negative string length {}", len)));
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| TlcsError::Protocol(format!("invalid utf-8 in string: {}", e)))
    }

    pub fn read_string_list(&mut self) -> Result<Vec<String>> {
        let count = self.read_i32()?;
        if count < 0 {
            return Err(TlcsError::Protocol(format!("negative list length {}", count)));
        }
        (0..count).map(|_| self.read_string()).collect()
    }

    /// Reads a command length prefix and returns `(command_id, payload_len)`.
    pub fn read_command_header(&mut self) -> Result<(u8, usize)> {
        let short = self.read_u8()?;
        let (total, header) = if short == 0 {
            let long = self.read_i32()?;
            if long < 6 {
                return Err(TlcsError::Protocol(format!("bad command length {}", long)));
            }
            (long as usize, 6)
        } else {
            (short as usize, 2)
        };
        if total < header {
            return Err(TlcsError::Protocol(format!("bad command length {}", total)));
        }
        let id = self.read_u8()?;
        Ok((id, total - header))
    }
}

/// A value returned by a get command.
#[derive(Debug, Clone, PartialEq)]
pub enum TraciValue {
    Ubyte(u8),
    Integer(i32),
    Double(f64),
    String(String),
    StringList(Vec<String>),
}

impl TraciValue {
    pub fn read(reader: &mut Reader<'_>) -> Result<Self> {
        match reader.read_u8()? {
            TYPE_UBYTE => Ok(TraciValue::Ubyte(reader.read_u8()?)),
            TYPE_INTEGER => Ok(TraciValue::Integer(reader.read_i32()?)),
            TYPE_DOUBLE => Ok(TraciValue::Double(reader.read_f64()?)),
            TYPE_STRING => Ok(TraciValue::String(reader.read_string()?)),
            TYPE_STRINGLIST => Ok(TraciValue::StringList(reader.read_string_list()?)),
            other => Err(TlcsError::Protocol(format!("unsupported value type 0x{:02x}", other))),
        }
    }
}

/// Wraps a payload into a command with the right length prefix.
pub fn encode_command(command: u8, payload: &[u8]) -> Vec<u8> {
    let mut storage = Storage::new();
    let length = 1 + 1 + payload.len();
    if length <= 255 {
        storage.write_u8(length as u8);
    } else {
        storage.write_u8(0).write_i32((length + 4) as i32);
    }
    storage.write_u8(command).write_bytes(payload);
    storage.into_bytes()
}

/// Prefixes commands with the total message length.
pub fn frame_message(commands: &[Vec<u8>]) -> Vec<u8> {
    let body_len: usize = commands.iter().map(Vec::len).sum();
    let mut storage = Storage::new();
    storage.write_i32((body_len + 4) as i32);
    for command in commands {
        storage.write_bytes(command);
    }
    storage.into_bytes()
}

pub fn get_variable_command(domain: u8, variable: u8, object_id: &str) -> Vec<u8> {
    let mut payload = Storage::new();
    payload.write_u8(variable).write_string(object_id);
    encode_command(domain, &payload.into_bytes())
}

pub fn set_int_command(domain: u8, variable: u8, object_id: &str, value: i32) -> Vec<u8> {
    let mut payload = Storage::new();
    payload
        .write_u8(variable)
        .write_string(object_id)
        .write_u8(TYPE_INTEGER)
        .write_i32(value);
    encode_command(domain, &payload.into_bytes())
}

/// `target_time` 0 advances exactly one simulation step.
pub fn simulation_step_command(target_time: f64) -> Vec<u8> {
    let mut payload = Storage::new();
    payload.write_f64(target_time);
    encode_command(CMD_SIMSTEP, &payload.into_bytes())
}

/// The status block SUMO sends for every command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub command: u8,
    pub result: u8,
    pub description: String,
}

impl Status {
    pub fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let (command, _) = reader.read_command_header()?;
        let result = reader.read_u8()?;
        let description = reader.read_string()?;
        Ok(Self {
            command,
            result,
            description,
        })
    }

    /// Errors unless this is an OK status for `expected`.
    pub fn check(self, expected: u8) -> Result<()> {
        if self.command != expected {
            return Err(TlcsError::Protocol(format!(
                "status for command 0x{:02x}, expected 0x{:02x}",
                self.command, expected
            )));
        }
        if self.result != RTYPE_OK {
            return Err(TlcsError::CommandFailed {
                command: self.command,
                description: self.description,
            });
        }
        Ok(())
    }
}

/// Parses the response command that follows the status of a get command.
pub fn read_get_response(
    reader: &mut Reader<'_>,
    domain: u8,
    variable: u8,
    object_id: &str,
) -> Result<TraciValue> {
    let (response, _) = reader.read_command_header()?;
    let expected = domain.wrapping_add(RESPONSE_OFFSET);
    if response != expected {
        return Err(TlcsError::Protocol(format!(
            "response 0x{:02x}, expected 0x{:02x}",
            response, expected
        )));
    }
    let returned_variable = reader.read_u8()?;
    let returned_id = reader.read_string()?;
    if returned_variable != variable || returned_id != object_id {
        return Err(TlcsError::Protocol(format!(
            "response for 0x{:02x} '{}', asked for 0x{:02x} '{}'",
            returned_variable, returned_id, variable, object_id
        )));
    }
    TraciValue::read(reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_bytes(command: u8, result: u8, description: &str) -> Vec<u8> {
        let mut payload = Storage::new();
        payload.write_u8(result).write_string(description);
        encode_command(command, &payload.into_bytes())
    }

    #[test]
    fn get_command_layout() {
        let bytes = get_variable_command(CMD_GET_EDGE_VARIABLE, LAST_STEP_VEHICLE_HALTING_NUMBER, "N2TL");
        // len, cmd, var, string(len=4, "N2TL")
        assert_eq!(bytes, vec![11, 0xaa, 0x14, 0, 0, 0, 4, b'N', b'2', b'T', b'L']);
    }

    #[test]
    fn set_phase_command_layout() {
        let bytes = set_int_command(CMD_SET_TL_VARIABLE, TL_PHASE_INDEX, "TL", 3);
        assert_eq!(
            bytes,
            vec![14, 0xc2, 0x22, 0, 0, 0, 2, b'T', b'L', TYPE_INTEGER, 0, 0, 0, 3]
        );
    }

    #[test]
    fn long_commands_use_extended_length() {
        let payload = vec![7u8; 300];
        let bytes = encode_command(0x42, &payload);
        assert_eq!(bytes[0], 0);
        assert_eq!(i32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]), 306);
        assert_eq!(bytes[5], 0x42);
        assert_eq!(bytes.len(), 306);

        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.read_command_header().unwrap(), (0x42, 300));
    }

    #[test]
    fn message_framing_counts_header() {
        let step = simulation_step_command(0.0);
        assert_eq!(step.len(), 10);
        let message = frame_message(&[step.clone()]);
        assert_eq!(&message[..4], &14i32.to_be_bytes());
        assert_eq!(&message[4..], &step[..]);
    }

    #[test]
    fn status_check_reports_failures() {
        let ok = status_bytes(CMD_SIMSTEP, RTYPE_OK, "");
        assert!(Status::read(&mut Reader::new(&ok)).unwrap().check(CMD_SIMSTEP).is_ok());

        let failed = status_bytes(CMD_SET_TL_VARIABLE, 0x01, "Phase index 9 out of range");
        let err = Status::read(&mut Reader::new(&failed))
            .unwrap()
            .check(CMD_SET_TL_VARIABLE)
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));

        assert!(Status::read(&mut Reader::new(&ok)).unwrap().check(CMD_CLOSE).is_err());
    }

    #[test]
    fn decodes_string_list_response() {
        let mut payload = Storage::new();
        payload
            .write_u8(ID_LIST)
            .write_string("")
            .write_u8(TYPE_STRINGLIST)
            .write_i32(2)
            .write_string("W_E_0")
            .write_string("N_S_1");
        let response = encode_command(CMD_GET_VEHICLE_VARIABLE + RESPONSE_OFFSET, &payload.into_bytes());

        let mut body = status_bytes(CMD_GET_VEHICLE_VARIABLE, RTYPE_OK, "");
        body.extend(response);

        let mut reader = Reader::new(&body);
        Status::read(&mut reader).unwrap().check(CMD_GET_VEHICLE_VARIABLE).unwrap();
        let value = read_get_response(&mut reader, CMD_GET_VEHICLE_VARIABLE, ID_LIST, "").unwrap();
        assert_eq!(
            value,
            TraciValue::StringList(vec!["W_E_0".to_string(), "N_S_1".to_string()])
        );
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn mismatched_response_is_rejected() {
        let mut payload = Storage::new();
        payload
            .write_u8(VAR_ACCUMULATED_WAITING_TIME)
            .write_string("car_1")
            .write_u8(TYPE_DOUBLE)
            .write_f64(12.5);
        let response = encode_command(CMD_GET_VEHICLE_VARIABLE + RESPONSE_OFFSET, &payload.into_bytes());

        let value = read_get_response(
            &mut Reader::new(&response),
            CMD_GET_VEHICLE_VARIABLE,
            VAR_ACCUMULATED_WAITING_TIME,
            "car_1",
        )
        .unwrap();
        assert_eq!(value, TraciValue::Double(12.5));

        assert!(read_get_response(
            &mut Reader::new(&response),
            CMD_GET_VEHICLE_VARIABLE,
            VAR_ACCUMULATED_WAITING_TIME,
            "car_2",
        )
        .is_err());
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut reader = Reader::new(&[0, 0, 0, 9, b'a']);
        assert!(reader.read_string().is_err());
        assert!(Reader::new(&[1, 2]).read_i32().is_err());
    }
}
