//! SASL mechanisms used during `connection.start-ok` and
//! `connection.secure-ok`.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::{ArgWriter, CodecError, FieldTable};

/// Produces authentication responses for one SASL mechanism.
pub trait SaslMechanism: fmt::Debug + Send + Sync {
    /// Mechanism name as listed in `connection.start`.
    fn name(&self) -> &str;

    /// Response to send for `challenge`; `None` asks for the initial
    /// response carried by `connection.start-ok`.
    ///
    /// # Errors
    ///
    /// Fails if the credentials cannot be encoded.
    fn respond(
        &self,
        challenge: Option<&[u8]>,
        username: &str,
        password: &str,
    ) -> Result<Bytes, CodecError>;
}

/// The mechanisms this crate implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaslMechanismKind {
    /// `PLAIN`: NUL-separated username and password.
    #[serde(rename = "PLAIN")]
    Plain,
    /// `AMQPLAIN`: a field table with `LOGIN` and `PASSWORD`.
    #[serde(rename = "AMQPLAIN")]
    AmqPlain,
    /// `EXTERNAL`: identity established outside AMQP, for example by a TLS
    /// client certificate.
    #[serde(rename = "EXTERNAL")]
    External,
}

impl SaslMechanism for SaslMechanismKind {
    fn name(&self) -> &str {
        match self {
            Self::Plain => "PLAIN",
            Self::AmqPlain => "AMQPLAIN",
            Self::External => "EXTERNAL",
        }
    }

    fn respond(
        &self,
        _challenge: Option<&[u8]>,
        username: &str,
        password: &str,
    ) -> Result<Bytes, CodecError> {
        match self {
            Self::Plain => {
                let mut response = Vec::with_capacity(username.len() + password.len() + 2);
                response.push(0);
                response.extend_from_slice(username.as_bytes());
                response.push(0);
                response.extend_from_slice(password.as_bytes());
                Ok(Bytes::from(response))
            }
            Self::AmqPlain => {
                let table = FieldTable::new()
                    .with("LOGIN", username)
                    .with("PASSWORD", password);
                let mut writer = ArgWriter::new();
                writer.write_table_entries(&table)?;
                Ok(writer.finish())
            }
            Self::External => Ok(Bytes::new()),
        }
    }
}

/// Whether `offered`, the space-separated list from `connection.start`,
/// contains `name`.
pub(crate) fn is_offered(offered: &[u8], name: &str) -> bool {
    offered
        .split(u8::is_ascii_whitespace)
        .any(|candidate| candidate == name.as_bytes())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn plain_separates_with_nul() {
        let response = SaslMechanismKind::Plain
            .respond(None, "guest", "secret")
            .expect("plain");
        assert_eq!(&response[..], b"\0guest\0secret");
    }

    #[rstest]
    fn amqplain_carries_table_entries_without_length_prefix() {
        let response = SaslMechanismKind::AmqPlain
            .respond(None, "u", "p")
            .expect("amqplain");
        let mut expected = Vec::new();
        expected.extend_from_slice(b"\x05LOGINS\x00\x00\x00\x01u");
        expected.extend_from_slice(b"\x08PASSWORDS\x00\x00\x00\x01p");
        assert_eq!(&response[..], &expected[..]);
    }

    #[rstest]
    fn external_is_empty() {
        let response = SaslMechanismKind::External
            .respond(None, "ignored", "ignored")
            .expect("external");
        assert!(response.is_empty());
    }

    #[rstest]
    #[case::first(b"PLAIN AMQPLAIN", "PLAIN", true)]
    #[case::second(b"PLAIN AMQPLAIN", "AMQPLAIN", true)]
    #[case::prefix_only(b"PLAINX", "PLAIN", false)]
    #[case::absent(b"AMQPLAIN", "EXTERNAL", false)]
    fn offered_list_matches_whole_names(
        #[case] offered: &[u8],
        #[case] name: &str,
        #[case] found: bool,
    ) {
        assert_eq!(is_offered(offered, name), found);
    }
}
