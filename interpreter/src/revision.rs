use core::fmt;
use core::str::FromStr;

/// Named hard-fork epoch. All gas schedules and opcode availability are
/// parameterised by revision; revisions are totally ordered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Revision {
	#[default]
	Istanbul = 0,
	Berlin = 1,
	London = 2,
	Paris = 3,
	Shanghai = 4,
	Cancun = 5,
	Prague = 6,
}

/// The newest revision the built-in engines implement.
pub const NEWEST_SUPPORTED_REVISION: Revision = Revision::Prague;

impl Revision {
	/// All revisions known to this build, oldest first.
	pub const fn all() -> [Revision; 7] {
		[
			Revision::Istanbul,
			Revision::Berlin,
			Revision::London,
			Revision::Paris,
			Revision::Shanghai,
			Revision::Cancun,
			Revision::Prague,
		]
	}

	#[must_use]
	pub const fn as_u8(self) -> u8 {
		self as u8
	}

	#[must_use]
	pub fn from_index(index: u64) -> Option<Revision> {
		Revision::all().get(index as usize).copied()
	}
}

impl fmt::Display for Revision {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Revision::Istanbul => "Istanbul",
			Revision::Berlin => "Berlin",
			Revision::London => "London",
			Revision::Paris => "Paris",
			Revision::Shanghai => "Shanghai",
			Revision::Cancun => "Cancun",
			Revision::Prague => "Prague",
		};
		f.write_str(name)
	}
}

/// Error returned when parsing an unknown revision name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown revision: {0}")]
pub struct UnknownRevision(pub String);

impl FromStr for Revision {
	type Err = UnknownRevision;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let revision = match s {
			"Istanbul" => Revision::Istanbul,
			"Berlin" => Revision::Berlin,
			"London" => Revision::London,
			"Paris" => Revision::Paris,
			"Shanghai" => Revision::Shanghai,
			"Cancun" => Revision::Cancun,
			"Prague" => Revision::Prague,
			other => {
				// The literal form `Revision(<int>)` round-trips unknown
				// discriminants printed by older tools.
				let inner = other
					.strip_prefix("Revision(")
					.and_then(|rest| rest.strip_suffix(')'))
					.ok_or_else(|| UnknownRevision(s.to_string()))?;
				let index: u64 = inner
					.parse()
					.map_err(|_| UnknownRevision(s.to_string()))?;
				return Revision::from_index(index).ok_or_else(|| UnknownRevision(s.to_string()));
			}
		};
		Ok(revision)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn revisions_are_ordered() {
		let all = Revision::all();
		for pair in all.windows(2) {
			assert!(pair[0] < pair[1]);
		}
		assert!(Revision::Istanbul < Revision::Berlin);
		assert!(Revision::Cancun >= Revision::Shanghai);
	}

	#[test]
	fn name_round_trip() {
		for revision in Revision::all() {
			let name = revision.to_string();
			assert_eq!(name.parse::<Revision>().unwrap(), revision);
		}
	}

	#[test]
	fn parses_literal_form() {
		assert_eq!("Revision(3)".parse::<Revision>().unwrap(), Revision::Paris);
		assert!("Revision(99)".parse::<Revision>().is_err());
		assert!("Byzantium".parse::<Revision>().is_err());
	}
}
