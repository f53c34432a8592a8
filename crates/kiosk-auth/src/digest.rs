//! RFC 7616 / RFC 2617 response computation.
//!
//! MD5 is what the printer firmware speaks; nothing else is offered.

use rand::RngCore;

use crate::challenge::Algorithm;

/// Counter value for the first request against a fresh nonce.
pub const INITIAL_NC: u32 = 1;

/// Inputs to a single response computation.
#[derive(Debug, Clone, Copy)]
pub struct DigestInput<'a> {
    pub method: &'a str,
    /// Request-URI exactly as sent on the request line (path + query).
    pub uri: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub realm: &'a str,
    pub nonce: &'a str,
    pub cnonce: &'a str,
    /// Eight hex digits, see [`format_nc`].
    pub nc: &'a str,
    pub qop: &'a str,
    pub algorithm: Algorithm,
}

impl DigestInput<'_> {
    /// HA1, derived from the credentials.
    pub fn ha1(&self) -> String {
        let base = md5_hex(&format!(
            "{}:{}:{}",
            self.username, self.realm, self.password
        ));
        match self.algorithm {
            Algorithm::Md5 => base,
            Algorithm::Md5Sess => md5_hex(&format!("{}:{}:{}", base, self.nonce, self.cnonce)),
        }
    }

    /// HA2, derived from the method and request-URI.
    pub fn ha2(&self) -> String {
        md5_hex(&format!("{}:{}", self.method, self.uri))
    }

    /// The `response` directive value.
    pub fn response(&self) -> String {
        md5_hex(&format!(
            "{}:{}:{}:{}:{}:{}",
            self.ha1(),
            self.nonce,
            self.nc,
            self.cnonce,
            self.qop,
            self.ha2()
        ))
    }
}

/// Compute the lowercase hex `response` for the given inputs.
pub fn compute_response(input: &DigestInput<'_>) -> String {
    input.response()
}

/// Generate a fresh client nonce: 16 random bytes, lowercase hex.
pub fn generate_cnonce() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Format a nonce count as the eight-digit hex string used on the wire.
pub fn format_nc(nc: u32) -> String {
    format!("{:08x}", nc)
}

fn md5_hex(data: &str) -> String {
    format!("{:x}", md5::compute(data.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rfc_input() -> DigestInput<'static> {
        DigestInput {
            method: "GET",
            uri: "/dir/index.html",
            username: "Mufasa",
            password: "Circle Of Life",
            realm: "testrealm@host.com",
            nonce: "dcd98b7102dd2f0e8b11d0f600bfb0c093",
            cnonce: "0a4f113b",
            nc: "00000001",
            qop: "auth",
            algorithm: Algorithm::Md5,
        }
    }

    #[test]
    fn test_rfc2617_vector() {
        assert_eq!(
            compute_response(&rfc_input()),
            "6629fae49393a05397450978507c4ef1"
        );
    }

    #[test]
    fn test_ha1_ha2_md5() {
        let input = rfc_input();
        assert_eq!(input.ha1(), "939e7578ed9e3c518a452acee763bce9");
        assert_eq!(input.ha2(), "39aff3a2bab6126f332b942af96d3366");
    }

    #[test]
    fn test_md5_sess_rehashes_ha1() {
        let plain = rfc_input();
        let sess = DigestInput {
            algorithm: Algorithm::Md5Sess,
            ..plain
        };
        let expected_ha1 = md5_hex(&format!(
            "939e7578ed9e3c518a452acee763bce9:{}:{}",
            plain.nonce, plain.cnonce
        ));
        assert_eq!(sess.ha1(), expected_ha1);
        assert_ne!(sess.response(), plain.response());
    }

    #[test]
    fn test_response_depends_on_counter_and_uri() {
        let base = rfc_input();
        let next = DigestInput {
            nc: "00000002",
            ..base
        };
        let other_uri = DigestInput {
            uri: "/dir/index.html?x=1",
            ..base
        };
        assert_ne!(base.response(), next.response());
        assert_ne!(base.response(), other_uri.response());
    }

    #[test]
    fn test_cnonce_shape() {
        let a = generate_cnonce();
        let b = generate_cnonce();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_format_nc() {
        assert_eq!(format_nc(INITIAL_NC), "00000001");
        assert_eq!(format_nc(255), "000000ff");
        assert_eq!(format_nc(u32::MAX), "ffffffff");
    }
}
