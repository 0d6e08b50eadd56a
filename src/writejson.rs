//! JSON write blueprint adapter
//!
//! Decodes externally supplied JSON write blueprints into [`WriteRequest`]
//! values. This lives outside the execution path: the manager only ever sees
//! the already-decoded requests.
//!
//! A blueprint is a single object or an array of objects:
//!
//! ```json
//! [
//!   { "functionCode": 6,  "address": 100, "value": 42 },
//!   { "functionCode": 16, "address": 200, "value": [1, 2, 3], "maxTries": 2 },
//!   { "functionCode": 5,  "address": 10,  "value": 1 }
//! ]
//! ```
//!
//! FC 5/15 take a single bit (non-zero = ON); FC 6 takes one register value;
//! FC 16 takes one or more. `maxTries` defaults to 1.

use serde::Deserialize;

use crate::error::{ModbusError, ModbusResult};
use crate::request::WriteRequest;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BlueprintValue {
    Bool(bool),
    Single(u16),
    Multiple(Vec<u16>),
}

impl BlueprintValue {
    fn as_bit(&self) -> ModbusResult<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            Self::Single(n) => Ok(*n != 0),
            Self::Multiple(values) if values.len() == 1 => Ok(values[0] != 0),
            Self::Multiple(_) => Err(ModbusError::invalid_data(
                "coil blueprint carries more than one bit",
            )),
        }
    }

    fn into_registers(self) -> ModbusResult<Vec<u16>> {
        match self {
            Self::Bool(_) => Err(ModbusError::invalid_data(
                "register blueprint carries a boolean",
            )),
            Self::Single(n) => Ok(vec![n]),
            Self::Multiple(values) => Ok(values),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct Blueprint {
    function_code: u8,
    address: u16,
    value: BlueprintValue,
    #[serde(default = "default_max_tries")]
    max_tries: u32,
}

fn default_max_tries() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BlueprintDocument {
    Single(Blueprint),
    Many(Vec<Blueprint>),
}

/// Parse a JSON write blueprint into write requests for `unit_id`.
pub fn parse_write_requests(unit_id: u8, json: &str) -> ModbusResult<Vec<WriteRequest>> {
    let document: BlueprintDocument = serde_json::from_str(json)
        .map_err(|e| ModbusError::invalid_data(format!("write blueprint JSON: {e}")))?;

    let blueprints = match document {
        BlueprintDocument::Single(one) => vec![one],
        BlueprintDocument::Many(many) => many,
    };

    blueprints
        .into_iter()
        .map(|blueprint| to_request(unit_id, blueprint))
        .collect()
}

fn to_request(unit_id: u8, blueprint: Blueprint) -> ModbusResult<WriteRequest> {
    match blueprint.function_code {
        0x05 => WriteRequest::coil(
            unit_id,
            blueprint.address,
            blueprint.value.as_bit()?,
            false,
            blueprint.max_tries,
        ),
        0x0F => WriteRequest::coil(
            unit_id,
            blueprint.address,
            blueprint.value.as_bit()?,
            true,
            blueprint.max_tries,
        ),
        0x06 => {
            let values = blueprint.value.into_registers()?;
            if values.len() != 1 {
                return Err(ModbusError::invalid_data(
                    "FC06 blueprint requires exactly one value",
                ));
            }
            WriteRequest::registers(unit_id, blueprint.address, values, false, blueprint.max_tries)
        }
        0x10 => WriteRequest::registers(
            unit_id,
            blueprint.address,
            blueprint.value.into_registers()?,
            true,
            blueprint.max_tries,
        ),
        other => Err(ModbusError::invalid_function(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_register_blueprint() {
        let requests =
            parse_write_requests(1, r#"{ "functionCode": 6, "address": 100, "value": 42 }"#)
                .unwrap();
        assert_eq!(
            requests,
            vec![WriteRequest::registers(1, 100, vec![42], false, 1).unwrap()]
        );
    }

    #[test]
    fn test_blueprint_array() {
        let json = r#"[
            { "functionCode": 5,  "address": 10,  "value": 1 },
            { "functionCode": 16, "address": 200, "value": [1, 2, 3], "maxTries": 2 }
        ]"#;
        let requests = parse_write_requests(2, json).unwrap();
        assert_eq!(
            requests,
            vec![
                WriteRequest::coil(2, 10, true, false, 1).unwrap(),
                WriteRequest::registers(2, 200, vec![1, 2, 3], true, 2).unwrap(),
            ]
        );
    }

    #[test]
    fn test_coil_accepts_bool_and_numeric() {
        let on = parse_write_requests(1, r#"{ "functionCode": 5, "address": 0, "value": true }"#)
            .unwrap();
        let off =
            parse_write_requests(1, r#"{ "functionCode": 5, "address": 0, "value": 0 }"#).unwrap();
        assert_eq!(on[0], WriteRequest::coil(1, 0, true, false, 1).unwrap());
        assert_eq!(off[0], WriteRequest::coil(1, 0, false, false, 1).unwrap());
    }

    #[test]
    fn test_rejects_bad_blueprints() {
        // unknown function code
        assert!(
            parse_write_requests(1, r#"{ "functionCode": 3, "address": 0, "value": 1 }"#).is_err()
        );
        // FC06 with an array
        assert!(parse_write_requests(
            1,
            r#"{ "functionCode": 6, "address": 0, "value": [1, 2] }"#
        )
        .is_err());
        // unknown field
        assert!(parse_write_requests(
            1,
            r#"{ "functionCode": 6, "address": 0, "value": 1, "bogus": true }"#
        )
        .is_err());
        // malformed JSON
        assert!(parse_write_requests(1, "not json").is_err());
    }
}
