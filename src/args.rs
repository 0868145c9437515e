//! Constructor argument parsing.
//!
//! Deploy tasks receive their constructor arguments as a single
//! comma-separated string. Array-valued arguments use `;` between elements:
//!
//! ```text
//! --arguments "My Token,1000000,0xaa;0xbb"
//! ```
//!
//! Each raw value is then converted according to the Solidity type the
//! contract's constructor declares at that position.
//!
//! # Example
//!
//! ```rust
//! use backoff_verify::args::{parse_arguments, split_string_array, AbiType, ConstructorArg};
//! use ruint::aliases::U256;
//!
//! let raw = split_string_array("Token,1000,0xaa;0xbb");
//! let types = [AbiType::String, AbiType::Uint256, AbiType::AddressArray];
//!
//! let parsed = parse_arguments(&raw, &types).unwrap();
//! assert_eq!(parsed[0], ConstructorArg::Text("Token".into()));
//! assert_eq!(parsed[1], ConstructorArg::Uint(U256::from(1000u64)));
//! assert_eq!(
//!     parsed[2],
//!     ConstructorArg::TextArray(vec!["0xaa".into(), "0xbb".into()])
//! );
//! ```

use std::fmt;
use std::str::FromStr;

use ruint::aliases::U256;

/// Separator between top-level arguments.
pub const ARGUMENT_SEPARATOR: char = ',';

/// Separator between the elements of an array-valued argument.
pub const ARRAY_SEPARATOR: char = ';';

/// Split a comma-separated CLI value into its parts.
///
/// Empty segments are kept, so `"a,,b"` yields three values.
pub fn split_string_array(value: &str) -> Vec<String> {
    value.split(ARGUMENT_SEPARATOR).map(str::to_owned).collect()
}

/// Constructor parameter types the deploy tasks know how to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbiType {
    /// `string`
    String,
    /// `address`
    Address,
    /// `string[]`
    StringArray,
    /// `address[]`
    AddressArray,
    /// `uint64`
    Uint64,
    /// `uint256`
    Uint256,
    /// `uint64[]`
    Uint64Array,
    /// `uint256[]`
    Uint256Array,
}

impl AbiType {
    /// The Solidity spelling of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            AbiType::String => "string",
            AbiType::Address => "address",
            AbiType::StringArray => "string[]",
            AbiType::AddressArray => "address[]",
            AbiType::Uint64 => "uint64",
            AbiType::Uint256 => "uint256",
            AbiType::Uint64Array => "uint64[]",
            AbiType::Uint256Array => "uint256[]",
        }
    }

    fn is_array(&self) -> bool {
        matches!(
            self,
            AbiType::StringArray
                | AbiType::AddressArray
                | AbiType::Uint64Array
                | AbiType::Uint256Array
        )
    }
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AbiType {
    type Err = ArgumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(AbiType::String),
            "address" => Ok(AbiType::Address),
            "string[]" => Ok(AbiType::StringArray),
            "address[]" => Ok(AbiType::AddressArray),
            "uint64" => Ok(AbiType::Uint64),
            "uint256" => Ok(AbiType::Uint256),
            "uint64[]" => Ok(AbiType::Uint64Array),
            "uint256[]" => Ok(AbiType::Uint256Array),
            other => Err(ArgumentError::UnknownType(other.to_owned())),
        }
    }
}

/// A parsed constructor argument, ready to hand to a contract provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructorArg {
    /// A `string` or `address`, passed through verbatim.
    Text(String),
    /// A `string[]` or `address[]`.
    TextArray(Vec<String>),
    /// A `uint64` or `uint256`.
    Uint(U256),
    /// A `uint64[]` or `uint256[]`.
    UintArray(Vec<U256>),
    /// ABI-encoded bytes, such as proxy initializer calldata.
    Bytes(Vec<u8>),
}

impl fmt::Display for ConstructorArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructorArg::Text(s) => f.write_str(s),
            ConstructorArg::TextArray(items) => write!(f, "[{}]", items.join(", ")),
            ConstructorArg::Uint(n) => write!(f, "{}", n),
            ConstructorArg::UintArray(items) => {
                let items: Vec<String> = items.iter().map(|n| n.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            ConstructorArg::Bytes(bytes) => {
                f.write_str("0x")?;
                bytes.iter().try_for_each(|b| write!(f, "{:02x}", b))
            }
        }
    }
}

/// Errors raised while turning raw strings into constructor arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    /// The constructor declares a type this crate cannot parse.
    UnknownType(String),
    /// The number of provided values differs from the constructor's arity.
    ArityMismatch {
        /// Parameters the constructor declares.
        required: usize,
        /// Values the caller supplied.
        provided: usize,
    },
    /// A value could not be parsed as an unsigned integer of the given type.
    InvalidInteger {
        /// The offending value.
        value: String,
        /// The target type.
        ty: AbiType,
        /// Why parsing failed.
        reason: String,
    },
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentError::UnknownType(ty) => write!(f, "Unknown type: {}", ty),
            ArgumentError::ArityMismatch { required, provided } => write!(
                f,
                "Arguments and argument types must have the same length. \
                 Required args: {}, provided args: {}",
                required, provided
            ),
            ArgumentError::InvalidInteger { value, ty, reason } => {
                write!(f, "invalid {} value {:?}: {}", ty, value, reason)
            }
        }
    }
}

impl std::error::Error for ArgumentError {}

/// Convert one raw value according to its declared type.
///
/// Strings and addresses pass through untouched. Integers accept decimal or
/// `0x`-prefixed hex after trimming surrounding whitespace; `uint64` values
/// above `u64::MAX` are rejected.
pub fn parse_argument(value: &str, ty: AbiType) -> Result<ConstructorArg, ArgumentError> {
    if !ty.is_array() {
        return match ty {
            AbiType::Uint64 | AbiType::Uint256 => parse_uint(value, ty).map(ConstructorArg::Uint),
            _ => Ok(ConstructorArg::Text(value.to_owned())),
        };
    }

    let elements = value.split(ARRAY_SEPARATOR);
    match ty {
        AbiType::Uint64Array | AbiType::Uint256Array => elements
            .map(|element| parse_uint(element, ty))
            .collect::<Result<Vec<_>, _>>()
            .map(ConstructorArg::UintArray),
        _ => Ok(ConstructorArg::TextArray(
            elements.map(str::to_owned).collect(),
        )),
    }
}

/// Convert every raw value against the constructor's declared parameter types.
pub fn parse_arguments<S: AsRef<str>>(
    values: &[S],
    types: &[AbiType],
) -> Result<Vec<ConstructorArg>, ArgumentError> {
    if values.len() != types.len() {
        return Err(ArgumentError::ArityMismatch {
            required: types.len(),
            provided: values.len(),
        });
    }

    values
        .iter()
        .zip(types)
        .map(|(value, ty)| parse_argument(value.as_ref(), *ty))
        .collect()
}

fn parse_uint(value: &str, ty: AbiType) -> Result<U256, ArgumentError> {
    let invalid = |reason: String| ArgumentError::InvalidInteger {
        value: value.to_owned(),
        ty,
        reason,
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty value".to_owned()));
    }

    let parsed = U256::from_str(trimmed).map_err(|e| invalid(e.to_string()))?;
    let is_64_bit = matches!(ty, AbiType::Uint64 | AbiType::Uint64Array);
    if is_64_bit && parsed > U256::from(u64::MAX) {
        return Err(invalid("exceeds u64::MAX".to_owned()));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_string_array() {
        assert_eq!(split_string_array("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(split_string_array("single"), vec!["single"]);
        assert_eq!(split_string_array("a,,b"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_abi_type_round_trips_through_str() {
        for ty in [
            AbiType::String,
            AbiType::Address,
            AbiType::StringArray,
            AbiType::AddressArray,
            AbiType::Uint64,
            AbiType::Uint256,
            AbiType::Uint64Array,
            AbiType::Uint256Array,
        ] {
            assert_eq!(ty.as_str().parse::<AbiType>(), Ok(ty));
        }
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(
            "bytes32".parse::<AbiType>(),
            Err(ArgumentError::UnknownType("bytes32".to_string()))
        );
        assert_eq!(
            ArgumentError::UnknownType("bool".into()).to_string(),
            "Unknown type: bool"
        );
    }

    #[test]
    fn test_text_passes_through() {
        assert_eq!(
            parse_argument("0xAbC", AbiType::Address),
            Ok(ConstructorArg::Text("0xAbC".into()))
        );
        assert_eq!(
            parse_argument("a;b", AbiType::String),
            Ok(ConstructorArg::Text("a;b".into()))
        );
    }

    #[test]
    fn test_text_arrays_split_on_semicolon() {
        assert_eq!(
            parse_argument("x;y;z", AbiType::StringArray),
            Ok(ConstructorArg::TextArray(vec![
                "x".into(),
                "y".into(),
                "z".into()
            ]))
        );
    }

    #[test]
    fn test_uint256_decimal_and_hex() {
        assert_eq!(
            parse_argument("1000000000000000000000", AbiType::Uint256),
            Ok(ConstructorArg::Uint(
                U256::from(1_000_000_000_000_000_000_000u128)
            ))
        );
        assert_eq!(
            parse_argument("0xff", AbiType::Uint256),
            Ok(ConstructorArg::Uint(U256::from(255u64)))
        );
        assert_eq!(
            parse_argument(" 42 ", AbiType::Uint256),
            Ok(ConstructorArg::Uint(U256::from(42u64)))
        );
    }

    #[test]
    fn test_uint64_bounds() {
        assert_eq!(
            parse_argument("18446744073709551615", AbiType::Uint64),
            Ok(ConstructorArg::Uint(U256::from(u64::MAX)))
        );
        assert!(matches!(
            parse_argument("18446744073709551616", AbiType::Uint64),
            Err(ArgumentError::InvalidInteger { ty: AbiType::Uint64, .. })
        ));
    }

    #[test]
    fn test_uint_arrays() {
        assert_eq!(
            parse_argument("1;2;3", AbiType::Uint64Array),
            Ok(ConstructorArg::UintArray(vec![
                U256::from(1u64),
                U256::from(2u64),
                U256::from(3u64)
            ]))
        );
        assert!(parse_argument("1;x;3", AbiType::Uint256Array).is_err());
    }

    #[test]
    fn test_invalid_integers() {
        assert!(matches!(
            parse_argument("-1", AbiType::Uint256),
            Err(ArgumentError::InvalidInteger { .. })
        ));
        assert!(matches!(
            parse_argument("", AbiType::Uint256),
            Err(ArgumentError::InvalidInteger { .. })
        ));
    }

    #[test]
    fn test_arity_mismatch() {
        let err = parse_arguments(&["a"], &[AbiType::String, AbiType::Uint256]).unwrap_err();
        assert_eq!(
            err,
            ArgumentError::ArityMismatch {
                required: 2,
                provided: 1
            }
        );
        assert!(err
            .to_string()
            .contains("Required args: 2, provided args: 1"));
    }

    #[test]
    fn test_parse_arguments_in_order() {
        let parsed = parse_arguments(
            &split_string_array("Token,7"),
            &[AbiType::String, AbiType::Uint64],
        )
        .unwrap();

        assert_eq!(
            parsed,
            vec![
                ConstructorArg::Text("Token".into()),
                ConstructorArg::Uint(U256::from(7u64))
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ConstructorArg::Bytes(vec![0xde, 0xad]).to_string(), "0xdead");
        assert_eq!(
            ConstructorArg::UintArray(vec![U256::from(1u64), U256::from(2u64)]).to_string(),
            "[1, 2]"
        );
    }
}
