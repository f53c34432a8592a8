//! `Authorization: Digest ...` serialization.

use std::fmt;

use crate::challenge::{Algorithm, DIGEST_SCHEME};

/// Fields of an `Authorization` header value.
///
/// Serialized with a fixed field order; `nc` is the only unquoted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationHeader<'a> {
    pub username: &'a str,
    pub realm: &'a str,
    pub nonce: &'a str,
    pub uri: &'a str,
    pub qop: &'a str,
    pub cnonce: &'a str,
    pub nc: &'a str,
    pub response: &'a str,
    pub algorithm: Algorithm,
    pub opaque: Option<&'a str>,
}

impl fmt::Display for AuthorizationHeader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"{} username="{}", realm="{}", nonce="{}", uri="{}", qop="{}", nc={}, cnonce="{}", response="{}", algorithm="{}""#,
            DIGEST_SCHEME,
            self.username,
            self.realm,
            self.nonce,
            self.uri,
            self.qop,
            self.nc,
            self.cnonce,
            self.response,
            self.algorithm,
        )?;
        if let Some(opaque) = self.opaque {
            write!(f, r#", opaque="{}""#, opaque)?;
        }
        Ok(())
    }
}

impl AuthorizationHeader<'_> {
    /// Render the header value.
    pub fn build(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::{Challenge, parse_directives};
    use proptest::prelude::*;

    fn sample() -> AuthorizationHeader<'static> {
        AuthorizationHeader {
            username: "Mufasa",
            realm: "testrealm@host.com",
            nonce: "dcd98b7102dd2f0e8b11d0f600bfb0c093",
            uri: "/dir/index.html",
            qop: "auth",
            cnonce: "0a4f113b",
            nc: "00000001",
            response: "6629fae49393a05397450978507c4ef1",
            algorithm: Algorithm::Md5,
            opaque: Some("5ccc069c403ebaf9f0171e9517f40e41"),
        }
    }

    #[test]
    fn test_exact_wire_format() {
        assert_eq!(
            sample().build(),
            r#"Digest username="Mufasa", realm="testrealm@host.com", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", uri="/dir/index.html", qop="auth", nc=00000001, cnonce="0a4f113b", response="6629fae49393a05397450978507c4ef1", algorithm="MD5", opaque="5ccc069c403ebaf9f0171e9517f40e41""#
        );
    }

    #[test]
    fn test_opaque_omitted_when_absent() {
        let header = AuthorizationHeader {
            opaque: None,
            algorithm: Algorithm::Md5Sess,
            ..sample()
        };
        let value = header.build();
        assert!(value.ends_with(r#"algorithm="MD5-sess""#));
        assert!(!value.contains("opaque"));
    }

    #[test]
    fn test_parser_reads_back_builder_output() {
        let header = sample().build();
        let directives = parse_directives(&header).unwrap();
        assert_eq!(directives["username"], "Mufasa");
        assert_eq!(directives["nc"], "00000001");
        assert_eq!(directives["response"], "6629fae49393a05397450978507c4ef1");

        let challenge = Challenge::from_directives(&directives).unwrap();
        assert_eq!(challenge.realm, "testrealm@host.com");
        assert_eq!(challenge.nonce, "dcd98b7102dd2f0e8b11d0f600bfb0c093");
        assert_eq!(challenge.qop, "auth");
        assert_eq!(challenge.algorithm, Algorithm::Md5);
        assert_eq!(
            challenge.opaque.as_deref(),
            Some("5ccc069c403ebaf9f0171e9517f40e41")
        );
    }

    proptest! {
        #[test]
        fn prop_parser_recovers_challenge_fields(
            realm in "[A-Za-z0-9@. ,=_-]{1,24}",
            nonce in "[A-Za-z0-9+/=]{1,40}",
            opaque in proptest::option::of("[A-Za-z0-9]{1,32}"),
            sess in any::<bool>(),
        ) {
            let algorithm = if sess { Algorithm::Md5Sess } else { Algorithm::Md5 };
            let header = AuthorizationHeader {
                realm: &realm,
                nonce: &nonce,
                algorithm,
                opaque: opaque.as_deref(),
                ..sample()
            };

            let challenge = Challenge::parse(&header.build()).unwrap();
            prop_assert_eq!(challenge.realm, realm);
            prop_assert_eq!(challenge.nonce, nonce);
            prop_assert_eq!(challenge.qop, "auth");
            prop_assert_eq!(challenge.algorithm, algorithm);
            prop_assert_eq!(challenge.opaque, opaque);
        }
    }
}
