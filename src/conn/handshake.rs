// Copyright (c) 2026 myconn contributors
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

//! Login negotiation.
//!
//! The [`Negotiator`] consumes and produces raw packet payloads and never
//! touches the wire itself. The connection pumps packets through it:
//! greeting in, login packet out, then the server's verdict in, until the
//! negotiator reaches [`NegotiationStage::Ready`]. Keeping it off the
//! stream lets the whole exchange run against captured byte vectors.

use std::io::Write as _;

use byteorder::{WriteBytesExt, LE};
use log::{debug, trace};

use crate::consts::{self, CapabilityFlags, ProtocolProfile};
use crate::error::DriverError::{OldScrambleDisabled, TlsNotSupported, UnexpectedPacket, UnsupportedProtocol};
use crate::error::Error::DriverError;
use crate::error::Result as MyResult;
use crate::io::Write;
use crate::packet::{self, HandshakePacket, OkPacket};
use crate::scramble::{scramble_323, scramble_410, scramble_native};

use super::opts::Opts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStage {
    AwaitingGreeting,
    CapabilitiesComputed,
    AuthSent,
    AuthSwitchRequested,
    Ready,
}

/// What to do with the server's reply to a login packet.
#[derive(Debug)]
pub enum AuthOutcome {
    Accepted(OkPacket),
    /// The server asked for the legacy scramble mid-authentication. The
    /// payload must go out as the next packet of the same exchange.
    Resend(Vec<u8>),
}

#[derive(Debug)]
pub struct Negotiator<'a> {
    opts: &'a Opts,
    stage: NegotiationStage,
    greeting: Option<HandshakePacket>,
    client_flags: CapabilityFlags,
    profile: Option<ProtocolProfile>,
}

impl<'a> Negotiator<'a> {
    pub fn new(opts: &'a Opts) -> Negotiator<'a> {
        Negotiator {
            opts,
            stage: NegotiationStage::AwaitingGreeting,
            greeting: None,
            client_flags: CapabilityFlags::empty(),
            profile: None,
        }
    }

    pub fn stage(&self) -> NegotiationStage {
        self.stage
    }

    /// The negotiated profile. Valid once the greeting was handled.
    pub fn profile(&self) -> Option<ProtocolProfile> {
        self.profile
    }

    pub fn connection_id(&self) -> u32 {
        self.greeting.as_ref().map(|g| g.connection_id).unwrap_or(0)
    }

    pub fn character_set(&self) -> u8 {
        self.greeting.as_ref().map(|g| g.character_set).unwrap_or(0)
    }

    pub(crate) fn seed(&self) -> &[u8] {
        self.greeting
            .as_ref()
            .map(|g| g.auth_plugin_data.as_slice())
            .unwrap_or(&[])
    }

    /// Parses the server greeting and computes the capability intersection.
    pub fn handle_greeting(&mut self, pld: &[u8]) -> MyResult<()> {
        if self.stage != NegotiationStage::AwaitingGreeting {
            return Err(DriverError(UnexpectedPacket));
        }
        let greeting = HandshakePacket::from_payload(pld)?;
        if greeting.protocol_version != 10u8 {
            return Err(DriverError(UnsupportedProtocol(greeting.protocol_version)));
        }

        let mut desired = CapabilityFlags::CLIENT_LONG_PASSWORD
            | CapabilityFlags::CLIENT_LONG_FLAG
            | CapabilityFlags::CLIENT_PROTOCOL_41
            | CapabilityFlags::CLIENT_TRANSACTIONS
            | CapabilityFlags::CLIENT_LOCAL_FILES
            | CapabilityFlags::CLIENT_SECURE_CONNECTION
            | CapabilityFlags::CLIENT_MULTI_STATEMENTS
            | CapabilityFlags::CLIENT_MULTI_RESULTS
            | CapabilityFlags::CLIENT_PS_MULTI_RESULTS;
        if self.opts.get_db_name().is_some() {
            desired |= CapabilityFlags::CLIENT_CONNECT_WITH_DB;
        }
        if self.opts.get_compress() {
            desired |= CapabilityFlags::CLIENT_COMPRESS;
        }
        if self.opts.get_interactive() {
            desired |= CapabilityFlags::CLIENT_INTERACTIVE;
        }
        let mut flags = desired & greeting.capability_flags;
        if self.opts.ssl_enabled() {
            if !greeting
                .capability_flags
                .contains(CapabilityFlags::CLIENT_SSL)
            {
                return Err(DriverError(TlsNotSupported));
            }
            flags |= CapabilityFlags::CLIENT_SSL;
        }

        let profile = ProtocolProfile::new(greeting.server_version, flags);
        debug!(
            "greeting from server {}.{}.{}, era {:?}, capabilities {:?}",
            greeting.server_version.0,
            greeting.server_version.1,
            greeting.server_version.2,
            profile.era,
            flags
        );
        self.client_flags = flags;
        self.profile = Some(profile);
        self.greeting = Some(greeting);
        self.stage = NegotiationStage::CapabilitiesComputed;
        Ok(())
    }

    pub fn wants_tls(&self) -> bool {
        self.client_flags.contains(CapabilityFlags::CLIENT_SSL)
    }

    /// The plaintext capability packet sent before the TLS upgrade. The
    /// full login packet is resent over the encrypted channel afterwards.
    pub fn ssl_request_payload(&self) -> Vec<u8> {
        let mut writer = Vec::with_capacity(4 + 4 + 1 + 23);
        let _ = writer.write_u32::<LE>(self.client_flags.bits());
        let _ = writer.write_all(&[0u8; 4]);
        let _ = writer.write_u8(consts::UTF8_GENERAL_CI);
        let _ = writer.write_all(&[0u8; 23]);
        writer
    }

    /// Builds the login packet for the negotiated format era.
    pub fn auth_payload(&mut self) -> MyResult<Vec<u8>> {
        let profile = match self.profile {
            Some(profile) => profile,
            None => return Err(DriverError(UnexpectedPacket)),
        };
        let user = self.opts.get_user().unwrap_or("");
        let db_name = self.opts.get_db_name();
        let scramble_buf = self.scramble()?;

        let mut writer = Vec::with_capacity(1024);
        if profile.era.is_41() {
            writer.write_u32::<LE>(self.client_flags.bits())?;
            writer.write_all(&[0u8; 4])?;
            writer.write_u8(consts::UTF8_GENERAL_CI)?;
            writer.write_all(&[0u8; 23])?;
            writer.write_all(user.as_bytes())?;
            writer.write_u8(0u8)?;
            if self
                .client_flags
                .contains(CapabilityFlags::CLIENT_SECURE_CONNECTION)
            {
                match scramble_buf {
                    Some(ref scr) => {
                        writer.write_u8(scr.len() as u8)?;
                        writer.write_all(scr)?;
                    }
                    None => writer.write_u8(0u8)?,
                }
            } else {
                if let Some(ref scr) = scramble_buf {
                    writer.write_all(scr)?;
                }
                writer.write_u8(0u8)?;
            }
            if let Some(db_name) = db_name {
                writer.write_all(db_name.as_bytes())?;
                writer.write_u8(0u8)?;
            }
        } else {
            // 3.2x login: 16-bit capability word and a 3-byte max packet
            // size, scramble is null terminated.
            writer.write_u16::<LE>(self.client_flags.bits() as u16)?;
            writer.write_le_uint_n(consts::MAX_PAYLOAD_LEN as u64, 3)?;
            writer.write_all(user.as_bytes())?;
            writer.write_u8(0u8)?;
            if let Some(ref scr) = scramble_buf {
                writer.write_all(scr)?;
            }
            writer.write_u8(0u8)?;
            if self
                .client_flags
                .contains(CapabilityFlags::CLIENT_CONNECT_WITH_DB)
            {
                if let Some(db_name) = db_name {
                    writer.write_all(db_name.as_bytes())?;
                    writer.write_u8(0u8)?;
                }
            }
        }
        self.stage = NegotiationStage::AuthSent;
        Ok(writer)
    }

    /// Scrambles the password per the negotiated era. When a 4.1.1+ server
    /// did not negotiate the secure connection capability the legacy
    /// scramble is used transparently, unless `secure_auth` forbids the
    /// downgrade.
    fn scramble(&self) -> MyResult<Option<Vec<u8>>> {
        let pass = self.opts.get_pass().unwrap_or("").as_bytes();
        let profile = match self.profile {
            Some(profile) => profile,
            None => return Err(DriverError(UnexpectedPacket)),
        };
        if pass.is_empty() {
            return Ok(None);
        }
        match profile.era {
            consts::FormatEra::Pre41 => Ok(Some(scramble_323(self.seed(), pass))),
            consts::FormatEra::Original41 => Ok(scramble_410(self.seed(), pass)),
            _ => {
                if profile.secure_auth() {
                    Ok(scramble_native(self.seed(), pass).map(|x| x.to_vec()))
                } else if self.opts.get_secure_auth() {
                    Err(DriverError(OldScrambleDisabled))
                } else {
                    Ok(Some(scramble_323(self.seed(), pass)))
                }
            }
        }
    }

    /// Digests the server's reply to the login packet.
    pub fn handle_auth_response(&mut self, pld: &[u8]) -> MyResult<AuthOutcome> {
        if pld.is_empty() {
            return Err(DriverError(UnexpectedPacket));
        }
        match self.stage {
            NegotiationStage::AuthSent | NegotiationStage::AuthSwitchRequested => (),
            _ => return Err(DriverError(UnexpectedPacket)),
        }
        let profile = match self.profile {
            Some(profile) => profile,
            None => return Err(DriverError(UnexpectedPacket)),
        };
        if packet::is_ok_packet(pld) {
            let ok = OkPacket::from_payload(pld, profile.era)?;
            trace!("authentication accepted");
            self.stage = NegotiationStage::Ready;
            return Ok(AuthOutcome::Accepted(ok));
        }
        if packet::is_err_packet(pld) {
            let err = packet::ErrPacket::from_payload(pld)?;
            return Err(err.into_mysql_error().into());
        }
        if pld[0] == 0xfe && self.stage == NegotiationStage::AuthSent {
            // Old password request. Only the first 8 seed bytes salt the
            // re-scramble.
            if self.opts.get_secure_auth() {
                return Err(DriverError(OldScrambleDisabled));
            }
            trace!("server requested the legacy scramble mid-authentication");
            self.stage = NegotiationStage::AuthSwitchRequested;
            let pass = self.opts.get_pass().unwrap_or("").as_bytes();
            let seed = self.seed();
            let head = &seed[..seed.len().min(8)];
            let mut payload = if pass.is_empty() {
                Vec::new()
            } else {
                scramble_323(head, pass)
            };
            payload.push(0u8);
            return Ok(AuthOutcome::Resend(payload));
        }
        Err(DriverError(UnexpectedPacket))
    }
}

#[cfg(test)]
mod test {
    use super::{AuthOutcome, NegotiationStage, Negotiator};
    use crate::consts::{CapabilityFlags, FormatEra};
    use crate::conn::opts::{Opts, OptsBuilder};
    use crate::error::DriverError;
    use crate::error::Error;
    use crate::scramble::scramble_323;

    fn greeting_41(seed: &[u8; 20], caps: CapabilityFlags, version: &str) -> Vec<u8> {
        let caps = caps.bits();
        let mut pld = vec![10u8];
        pld.extend_from_slice(version.as_bytes());
        pld.push(0);
        pld.extend_from_slice(&42u32.to_le_bytes());
        pld.extend_from_slice(&seed[..8]);
        pld.push(0);
        pld.extend_from_slice(&(caps as u16).to_le_bytes());
        pld.push(33);
        pld.extend_from_slice(&2u16.to_le_bytes());
        pld.extend_from_slice(&((caps >> 16) as u16).to_le_bytes());
        pld.push(21);
        pld.extend_from_slice(&[0u8; 10]);
        pld.extend_from_slice(&seed[8..]);
        pld.push(0);
        pld
    }

    fn greeting_320(seed: &[u8; 8], caps: CapabilityFlags, version: &str) -> Vec<u8> {
        let mut pld = vec![10u8];
        pld.extend_from_slice(version.as_bytes());
        pld.push(0);
        pld.extend_from_slice(&7u32.to_le_bytes());
        pld.extend_from_slice(seed);
        pld.push(0);
        pld.extend_from_slice(&(caps.bits() as u16).to_le_bytes());
        pld
    }

    fn modern_caps() -> CapabilityFlags {
        CapabilityFlags::CLIENT_PROTOCOL_41
            | CapabilityFlags::CLIENT_SECURE_CONNECTION
            | CapabilityFlags::CLIENT_LONG_PASSWORD
            | CapabilityFlags::CLIENT_LONG_FLAG
            | CapabilityFlags::CLIENT_TRANSACTIONS
            | CapabilityFlags::CLIENT_LOCAL_FILES
            | CapabilityFlags::CLIENT_CONNECT_WITH_DB
            | CapabilityFlags::CLIENT_COMPRESS
            | CapabilityFlags::CLIENT_MULTI_STATEMENTS
            | CapabilityFlags::CLIENT_MULTI_RESULTS
            | CapabilityFlags::CLIENT_PS_MULTI_RESULTS
    }

    #[test]
    fn native_login_packet_carries_reference_scramble() {
        let mut builder = OptsBuilder::new();
        builder.user(Some("root")).pass(Some("secret"));
        let opts: Opts = builder.into();
        let mut negotiator = Negotiator::new(&opts);
        negotiator
            .handle_greeting(&greeting_41(
                b"01234567890123456789",
                modern_caps(),
                "5.7.44-log",
            ))
            .unwrap();
        let profile = negotiator.profile().unwrap();
        assert_eq!(profile.era, FormatEra::Modern50);
        assert!(profile.secure_auth());
        assert!(!negotiator.wants_tls());

        let pld = negotiator.auth_payload().unwrap();
        assert_eq!(negotiator.stage(), NegotiationStage::AuthSent);
        // flags + max packet + charset + filler + "root\0" + length byte
        let scramble_at = 4 + 4 + 1 + 23 + 5;
        assert_eq!(pld[scramble_at], 20);
        let expected = [
            0x7a, 0xbe, 0x1a, 0x87, 0x76, 0xb5, 0x9e, 0x93, 0x10, 0x59, 0x45, 0x1f, 0x81, 0xe5,
            0x96, 0xa6, 0x0d, 0xbb, 0xf7, 0xa8,
        ];
        assert_eq!(&pld[scramble_at + 1..scramble_at + 21], &expected[..]);
    }

    #[test]
    fn accepts_ok_after_login() {
        let mut builder = OptsBuilder::new();
        builder.user(Some("root")).pass(Some("secret"));
        let opts: Opts = builder.into();
        let mut negotiator = Negotiator::new(&opts);
        negotiator
            .handle_greeting(&greeting_41(
                b"01234567890123456789",
                modern_caps(),
                "5.7.44",
            ))
            .unwrap();
        negotiator.auth_payload().unwrap();
        match negotiator.handle_auth_response(&[0, 0, 0, 2, 0, 0, 0]).unwrap() {
            AuthOutcome::Accepted(_) => (),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(negotiator.stage(), NegotiationStage::Ready);
    }

    #[test]
    fn interactive_sessions_offer_the_interactive_capability() {
        let caps = modern_caps() | CapabilityFlags::CLIENT_INTERACTIVE;

        let mut builder = OptsBuilder::new();
        builder.user(Some("root")).interactive(true);
        let opts: Opts = builder.into();
        let mut negotiator = Negotiator::new(&opts);
        negotiator
            .handle_greeting(&greeting_41(b"01234567890123456789", caps, "5.7.44"))
            .unwrap();
        let profile = negotiator.profile().unwrap();
        assert!(profile.has_capability(CapabilityFlags::CLIENT_INTERACTIVE));

        // The flag stays off unless asked for.
        let mut builder = OptsBuilder::new();
        builder.user(Some("root"));
        let opts: Opts = builder.into();
        let mut negotiator = Negotiator::new(&opts);
        negotiator
            .handle_greeting(&greeting_41(b"01234567890123456789", caps, "5.7.44"))
            .unwrap();
        let profile = negotiator.profile().unwrap();
        assert!(!profile.has_capability(CapabilityFlags::CLIENT_INTERACTIVE));
    }

    #[test]
    fn missing_secure_capability_falls_back_to_legacy_scramble() {
        let mut builder = OptsBuilder::new();
        builder.user(Some("root")).pass(Some("secret"));
        let opts: Opts = builder.into();
        let mut negotiator = Negotiator::new(&opts);
        let caps = modern_caps() - CapabilityFlags::CLIENT_SECURE_CONNECTION;
        negotiator
            .handle_greeting(&greeting_41(b"abcdefgh012345678901", caps, "5.0.96"))
            .unwrap();
        let pld = negotiator.auth_payload().unwrap();
        // Without the secure connection capability the scramble rides null
        // terminated behind the user name.
        let scramble_at = 4 + 4 + 1 + 23 + 5;
        let expected = scramble_323(b"abcdefgh012345678901", b"secret");
        assert_eq!(&pld[scramble_at..scramble_at + expected.len()], &expected[..]);
        assert_eq!(pld[scramble_at + expected.len()], 0);
    }

    #[test]
    fn forced_secure_auth_refuses_the_downgrade() {
        let mut builder = OptsBuilder::new();
        builder
            .user(Some("root"))
            .pass(Some("secret"))
            .secure_auth(true);
        let opts: Opts = builder.into();
        let mut negotiator = Negotiator::new(&opts);
        let caps = modern_caps() - CapabilityFlags::CLIENT_SECURE_CONNECTION;
        negotiator
            .handle_greeting(&greeting_41(b"abcdefgh012345678901", caps, "5.0.96"))
            .unwrap();
        match negotiator.auth_payload() {
            Err(Error::DriverError(DriverError::OldScrambleDisabled)) => (),
            other => panic!("unexpected outcome {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn old_scramble_request_is_refused_when_secure_auth_is_forced() {
        let mut builder = OptsBuilder::new();
        builder
            .user(Some("root"))
            .pass(Some("secret"))
            .secure_auth(true);
        let opts: Opts = builder.into();
        let mut negotiator = Negotiator::new(&opts);
        negotiator
            .handle_greeting(&greeting_41(
                b"abcdefgh012345678901",
                modern_caps(),
                "5.0.96",
            ))
            .unwrap();
        negotiator.auth_payload().unwrap();
        match negotiator.handle_auth_response(&[0xfe]) {
            Err(Error::DriverError(DriverError::OldScrambleDisabled)) => (),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn old_scramble_request_rescrambles_first_eight_seed_bytes() {
        let mut builder = OptsBuilder::new();
        builder.user(Some("root")).pass(Some("secret"));
        let opts: Opts = builder.into();
        let mut negotiator = Negotiator::new(&opts);
        negotiator
            .handle_greeting(&greeting_41(
                b"abcdefgh012345678901",
                modern_caps(),
                "5.0.96",
            ))
            .unwrap();
        negotiator.auth_payload().unwrap();
        match negotiator.handle_auth_response(&[0xfe]).unwrap() {
            AuthOutcome::Resend(pld) => {
                let mut expected = scramble_323(b"abcdefgh", b"secret");
                expected.push(0);
                assert_eq!(pld, expected);
                assert_eq!(negotiator.stage(), NegotiationStage::AuthSwitchRequested);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn empty_auth_reply_is_a_protocol_error() {
        let mut builder = OptsBuilder::new();
        builder.user(Some("root")).pass(Some("secret"));
        let opts: Opts = builder.into();
        let mut negotiator = Negotiator::new(&opts);
        negotiator
            .handle_greeting(&greeting_41(
                b"01234567890123456789",
                modern_caps(),
                "5.7.44",
            ))
            .unwrap();
        negotiator.auth_payload().unwrap();
        match negotiator.handle_auth_response(&[]) {
            Err(Error::DriverError(DriverError::UnexpectedPacket)) => (),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn legacy_server_gets_320_login_layout() {
        let mut builder = OptsBuilder::new();
        builder.user(Some("root")).pass(Some("secret"));
        let opts: Opts = builder.into();
        let mut negotiator = Negotiator::new(&opts);
        let caps = CapabilityFlags::CLIENT_LONG_PASSWORD | CapabilityFlags::CLIENT_TRANSACTIONS;
        negotiator
            .handle_greeting(&greeting_320(b"abcdefgh", caps, "3.23.58"))
            .unwrap();
        let profile = negotiator.profile().unwrap();
        assert_eq!(profile.era, FormatEra::Pre41);

        let pld = negotiator.auth_payload().unwrap();
        assert_eq!(&pld[..2], &caps.bits().to_le_bytes()[..2]);
        // 3-byte max packet size, then "root\0"
        assert_eq!(&pld[5..10], b"root\0");
        let expected = scramble_323(b"abcdefgh", b"secret");
        assert_eq!(&pld[10..10 + expected.len()], &expected[..]);
        assert_eq!(pld[10 + expected.len()], 0);
    }

    #[test]
    fn rejects_unknown_protocol_version() {
        let opts = Opts::default();
        let mut negotiator = Negotiator::new(&opts);
        let mut pld = greeting_320(b"abcdefgh", CapabilityFlags::empty(), "3.22.0");
        pld[0] = 9;
        match negotiator.handle_greeting(&pld) {
            Err(Error::DriverError(DriverError::UnsupportedProtocol(9))) => (),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[cfg(feature = "native-tls")]
    #[test]
    fn tls_request_without_server_support_fails() {
        use crate::conn::opts::SslOpts;

        let mut builder = OptsBuilder::new();
        builder.ssl_opts(Some(SslOpts::default()));
        let opts: Opts = builder.into();
        let mut negotiator = Negotiator::new(&opts);
        match negotiator.handle_greeting(&greeting_41(
            b"01234567890123456789",
            modern_caps(),
            "5.7.44",
        )) {
            Err(Error::DriverError(DriverError::TlsNotSupported)) => (),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
