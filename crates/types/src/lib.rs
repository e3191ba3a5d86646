//! # Care Plan Types
//!
//! Validated value types shared by the care plan crates.
//!
//! Every type here normalises its input on construction (trimming, upper-casing where the
//! format calls for it) and refuses to exist in an invalid state, so code holding an `Npi`
//! never needs to re-check that it is ten digits.

/// Errors raised when an identifier does not match its required format.
///
/// The `Display` text is the message shown to the person filling in the form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    #[error("NPI is required")]
    NpiRequired,
    #[error("NPI must be exactly 10 digits")]
    InvalidNpi,
    #[error("MRN is required")]
    MrnRequired,
    #[error("MRN must be exactly 6 digits")]
    InvalidMrn,
    #[error("ICD-10 code is required")]
    Icd10Required,
    #[error("Invalid ICD-10 code format. Expected format: A00 or A00.0000")]
    InvalidIcd10,
}

impl IdentifierError {
    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            IdentifierError::NpiRequired
            | IdentifierError::MrnRequired
            | IdentifierError::Icd10Required => "required",
            IdentifierError::InvalidNpi => "invalid_npi",
            IdentifierError::InvalidMrn => "invalid_mrn",
            IdentifierError::InvalidIcd10 => "invalid_icd10",
        }
    }
}

fn is_all_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_digit())
}

/// National Provider Identifier: exactly ten digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Npi(String);

impl Npi {
    pub const LEN: usize = 10;

    /// Parses an NPI, ignoring surrounding whitespace.
    pub fn parse(input: &str) -> Result<Self, IdentifierError> {
        let value = input.trim();
        if value.is_empty() {
            return Err(IdentifierError::NpiRequired);
        }
        if !is_all_digits(value, Self::LEN) {
            return Err(IdentifierError::InvalidNpi);
        }
        Ok(Self(value.to_owned()))
    }
}

/// Medical Record Number: exactly six digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mrn(String);

impl Mrn {
    pub const LEN: usize = 6;

    /// Parses an MRN, ignoring surrounding whitespace.
    pub fn parse(input: &str) -> Result<Self, IdentifierError> {
        let value = input.trim();
        if value.is_empty() {
            return Err(IdentifierError::MrnRequired);
        }
        if !is_all_digits(value, Self::LEN) {
            return Err(IdentifierError::InvalidMrn);
        }
        Ok(Self(value.to_owned()))
    }
}

/// ICD-10 diagnosis code, stored upper-case.
///
/// Accepted shape: one letter, two digits, then optionally a dot and one to four
/// letters or digits (`A00`, `G70.00`, `M54.5`, `I10.1234`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Icd10Code(String);

impl Icd10Code {
    /// Longest accepted code (`A00.0000`).
    pub const MAX_LEN: usize = 8;

    /// Parses an ICD-10 code, trimming and upper-casing first.
    pub fn parse(input: &str) -> Result<Self, IdentifierError> {
        let value = input.trim().to_ascii_uppercase();
        if value.is_empty() {
            return Err(IdentifierError::Icd10Required);
        }
        if !Self::is_well_formed(&value) {
            return Err(IdentifierError::InvalidIcd10);
        }
        Ok(Self(value))
    }

    fn is_well_formed(value: &str) -> bool {
        let bytes = value.as_bytes();
        if bytes.len() < 3 {
            return false;
        }
        if !bytes[0].is_ascii_uppercase() || !bytes[1].is_ascii_digit() || !bytes[2].is_ascii_digit()
        {
            return false;
        }
        match &bytes[3..] {
            [] => true,
            [b'.', rest @ ..] => {
                (1..=4).contains(&rest.len())
                    && rest
                        .iter()
                        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
            }
            _ => false,
        }
    }
}

macro_rules! string_newtype {
    ($ty:ident, $parse:expr) => {
        impl $ty {
            /// Returns the inner string as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $ty {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $parse(s)
            }
        }

        impl serde::Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $parse(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_newtype!(Npi, Npi::parse);
string_newtype!(Mrn, Mrn::parse);
string_newtype!(Icd10Code, Icd10Code::parse);
