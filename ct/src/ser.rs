//! Wire formats of conformance-test states.
//!
//! 256-bit words render as four 16-digit hex groups, most significant
//! first, separated by single spaces. Byte strings render as lower-case
//! hex with a `0x` prefix; the bare dialect is accepted on input.

use lazy_static::lazy_static;
use primitive_types::U256;
use regex::Regex;

pub use tosca_interpreter::uint::{h256_to_u256 as word_to_u256, u256_to_h256 as u256_to_word};

/// Render a word as its four hex quads.
#[must_use]
pub fn format_u256(value: U256) -> String {
	format!(
		"{:016x} {:016x} {:016x} {:016x}",
		value.0[3], value.0[2], value.0[1], value.0[0]
	)
}

/// Parse the four-quad form.
pub fn parse_u256(text: &str) -> Result<U256, String> {
	lazy_static! {
		static ref QUADS: Regex = Regex::new(
			"^([0-9a-fA-F]{16}) ([0-9a-fA-F]{16}) ([0-9a-fA-F]{16}) ([0-9a-fA-F]{16})$"
		)
		.unwrap();
	}
	let captures = QUADS
		.captures(text)
		.ok_or_else(|| format!("invalid U256: {text:?}"))?;
	let mut limbs = [0u64; 4];
	for (index, limb) in limbs.iter_mut().enumerate() {
		*limb = u64::from_str_radix(&captures[4 - index], 16)
			.map_err(|error| format!("invalid U256 ({error}): {text:?}"))?;
	}
	Ok(U256(limbs))
}

/// Render bytes in the prefixed hex dialect.
#[must_use]
pub fn format_bytes(bytes: &[u8]) -> String {
	format!("0x{}", hex::encode(bytes))
}

/// Parse either hex dialect.
pub fn parse_bytes(text: &str) -> Result<Vec<u8>, String> {
	let digits = text.strip_prefix("0x").unwrap_or(text);
	hex::decode(digits).map_err(|error| format!("invalid hex string ({error}): {text:?}"))
}

macro_rules! string_codec {
	($name:ident, $type:ty, $format:expr, $parse:expr) => {
		pub mod $name {
			use serde::{de::Error, Deserialize, Deserializer, Serializer};

			pub fn serialize<S: Serializer>(
				value: &$type,
				serializer: S,
			) -> Result<S::Ok, S::Error> {
				#[allow(clippy::redundant_closure_call)]
				serializer.serialize_str(&($format)(value))
			}

			pub fn deserialize<'de, D: Deserializer<'de>>(
				deserializer: D,
			) -> Result<$type, D::Error> {
				let text = String::deserialize(deserializer)?;
				#[allow(clippy::redundant_closure_call)]
				($parse)(&text).map_err(D::Error::custom)
			}
		}
	};
}

string_codec!(
	u256_string,
	primitive_types::U256,
	|value: &primitive_types::U256| super::format_u256(*value),
	|text: &str| super::parse_u256(text)
);

string_codec!(
	hex_string,
	Vec<u8>,
	|value: &Vec<u8>| super::format_bytes(value),
	|text: &str| super::parse_bytes(text)
);

string_codec!(
	h160_hex,
	primitive_types::H160,
	|value: &primitive_types::H160| super::format_bytes(value.as_bytes()),
	|text: &str| {
		let bytes = super::parse_bytes(text)?;
		if bytes.len() != 20 {
			return Err(format!("expected 20 bytes, got {}", bytes.len()));
		}
		Ok(primitive_types::H160::from_slice(&bytes))
	}
);

string_codec!(
	h256_hex,
	primitive_types::H256,
	|value: &primitive_types::H256| super::format_bytes(value.as_bytes()),
	|text: &str| {
		let bytes = super::parse_bytes(text)?;
		if bytes.len() != 32 {
			return Err(format!("expected 32 bytes, got {}", bytes.len()));
		}
		Ok(primitive_types::H256::from_slice(&bytes))
	}
);

string_codec!(
	revision_string,
	tosca_interpreter::Revision,
	|value: &tosca_interpreter::Revision| value.to_string(),
	|text: &str| text
		.parse::<tosca_interpreter::Revision>()
		.map_err(|error| error.to_string())
);

pub mod status_string {
	use serde::{de::Error, Deserialize, Deserializer, Serializer};
	use tosca_interpreter::Status;

	pub fn name(status: Status) -> &'static str {
		match status {
			Status::Running => "Running",
			Status::Stopped => "Stopped",
			Status::Returned => "Returned",
			Status::Reverted => "Reverted",
			Status::Failed => "Failed",
			Status::SelfDestructed => "SelfDestructed",
		}
	}

	pub fn parse(text: &str) -> Result<Status, String> {
		Ok(match text {
			"Running" => Status::Running,
			"Stopped" => Status::Stopped,
			"Returned" => Status::Returned,
			"Reverted" => Status::Reverted,
			"Failed" => Status::Failed,
			"SelfDestructed" => Status::SelfDestructed,
			other => return Err(format!("unknown status: {other:?}")),
		})
	}

	pub fn serialize<S: Serializer>(value: &Status, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(name(*value))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Status, D::Error> {
		let text = String::deserialize(deserializer)?;
		parse(&text).map_err(D::Error::custom)
	}
}

pub mod u256_vec_string {
	use primitive_types::U256;
	use serde::{de::Error, Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(values: &[U256], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_seq(values.iter().map(|value| super::format_u256(*value)))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(
		deserializer: D,
	) -> Result<Vec<U256>, D::Error> {
		let texts: Vec<String> = Vec::deserialize(deserializer)?;
		texts
			.iter()
			.map(|text| super::parse_u256(text).map_err(D::Error::custom))
			.collect()
	}
}

pub mod u256_map_string {
	use std::collections::BTreeMap;

	use primitive_types::U256;
	use serde::{de::Error, Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(
		values: &BTreeMap<U256, U256>,
		serializer: S,
	) -> Result<S::Ok, S::Error> {
		serializer.collect_map(
			values
				.iter()
				.map(|(key, value)| (super::format_u256(*key), super::format_u256(*value))),
		)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(
		deserializer: D,
	) -> Result<BTreeMap<U256, U256>, D::Error> {
		let texts: BTreeMap<String, String> = BTreeMap::deserialize(deserializer)?;
		texts
			.iter()
			.map(|(key, value)| {
				Ok((
					super::parse_u256(key).map_err(D::Error::custom)?,
					super::parse_u256(value).map_err(D::Error::custom)?,
				))
			})
			.collect()
	}
}

pub mod u256_set_string {
	use std::collections::BTreeSet;

	use primitive_types::U256;
	use serde::{de::Error, Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(
		values: &BTreeSet<U256>,
		serializer: S,
	) -> Result<S::Ok, S::Error> {
		serializer.collect_seq(values.iter().map(|value| super::format_u256(*value)))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(
		deserializer: D,
	) -> Result<BTreeSet<U256>, D::Error> {
		let texts: Vec<String> = Vec::deserialize(deserializer)?;
		texts
			.iter()
			.map(|text| super::parse_u256(text).map_err(D::Error::custom))
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn quad_format_round_trips() {
		for value in [
			U256::zero(),
			U256::one(),
			U256::MAX,
			U256::from(0xdead_beefu64) << 130,
		] {
			let text = format_u256(value);
			assert_eq!(parse_u256(&text).unwrap(), value);
		}
	}

	#[test]
	fn quad_format_is_most_significant_first() {
		let value = U256::one() << 192;
		assert_eq!(
			format_u256(value),
			"0000000000000001 0000000000000000 0000000000000000 0000000000000000"
		);
	}

	#[test]
	fn both_hex_dialects_parse() {
		assert_eq!(parse_bytes("0xfa").unwrap(), vec![0xfa]);
		assert_eq!(parse_bytes("fa").unwrap(), vec![0xfa]);
		assert_eq!(format_bytes(&[0xfa]), "0xfa");
		assert!(parse_bytes("0xg").is_err());
	}
}
