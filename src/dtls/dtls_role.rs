/// The `setup` attribute agreed over signaling (RFC 4145 / RFC 5763).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setup {
    Active,
    Passive,
    Actpass,
    Holdconn,
}

/// Represents the DTLS role in a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsRole {
    /// The DTLS client role.
    Client,
    /// The DTLS server role.
    Server,
}

impl Setup {
    /// ACTIVE opens as client; PASSIVE and HOLDCONN answer as server.
    /// ACTPASS is an offer-side placeholder the embedder must resolve; an
    /// unresolved value defaults to the server side.
    #[must_use]
    pub fn role(self) -> DtlsRole {
        match self {
            Setup::Active => DtlsRole::Client,
            Setup::Passive | Setup::Holdconn | Setup::Actpass => DtlsRole::Server,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_mapping() {
        assert_eq!(Setup::Active.role(), DtlsRole::Client);
        assert_eq!(Setup::Passive.role(), DtlsRole::Server);
        assert_eq!(Setup::Holdconn.role(), DtlsRole::Server);
        assert_eq!(Setup::Actpass.role(), DtlsRole::Server);
    }
}
