// cliscan Source Code File
//
// Copyright 2013 Hello Inc. All rights reserved.
//
// Licensed under the BSD 3-Clause license. See LICENSE file in the project root
// for full license information.

use super::config::ScanConfig;
use crate::api::{bleuuid::short_list, Advertisement, PeripheralId};
use bitflags::bitflags;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_cr as serde;
use std::fmt::{self, Display, Formatter};
use uuid::Uuid;

bitflags! {
    /// Why a discovery was reported.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MatchKind: u8 {
        /// It advertised one of the target services.
        const SERVICE = 0x01;
        /// Its identifier is the target device.
        const DEVICE = 0x02;
        /// No targets were configured, everything matches.
        const ANY = 0x04;
    }
}

impl Display for MatchKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str("+")?;
            }
            f.write_str(&name.to_ascii_lowercase())?;
            first = false;
        }
        Ok(())
    }
}

/// A peripheral that passed the session's filter.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_cr")
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub id: PeripheralId,
    pub advertisement: Advertisement,
    pub rssi: Option<i16>,
    #[cfg_attr(feature = "serde", serde(with = "match_kind_bits"))]
    pub matched: MatchKind,
}

impl Display for Discovery {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.id)?;
        match self.rssi {
            Some(rssi) => write!(f, " rssi={}", rssi)?,
            None => f.write_str(" rssi=?")?,
        }
        write!(
            f,
            " name={} services=[{}] match={}",
            self.advertisement.local_name.as_deref().unwrap_or("?"),
            short_list(&self.advertisement.services),
            self.matched
        )
    }
}

#[cfg(feature = "serde")]
mod match_kind_bits {
    use super::MatchKind;
    use serde_cr::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(kind: &MatchKind, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(kind.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MatchKind, D::Error> {
        u8::deserialize(deserializer).map(MatchKind::from_bits_truncate)
    }
}

/// Decides which discovery notifications a session reports.
///
/// A peripheral matches when it advertises any target service or carries the target device
/// identifier; with neither target configured, everything matches. A configured name is applied on
/// top of that.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    services: Vec<Uuid>,
    device: Option<Uuid>,
    name: Option<String>,
}

impl DiscoveryFilter {
    pub fn new(services: Vec<Uuid>, device: Option<Uuid>, name: Option<String>) -> Self {
        DiscoveryFilter {
            services,
            device,
            name,
        }
    }

    pub fn matches(&self, id: &PeripheralId, advertisement: &Advertisement) -> Option<MatchKind> {
        let mut kind = MatchKind::empty();
        if self.services.is_empty() && self.device.is_none() {
            kind |= MatchKind::ANY;
        }
        if advertisement
            .services
            .iter()
            .any(|service| self.services.contains(service))
        {
            kind |= MatchKind::SERVICE;
        }
        if self.device.is_some() && id.as_uuid() == self.device {
            kind |= MatchKind::DEVICE;
        }
        if kind.is_empty() {
            return None;
        }
        match &self.name {
            Some(name) if advertisement.local_name.as_deref() != Some(name.as_str()) => None,
            _ => Some(kind),
        }
    }
}

impl From<&ScanConfig> for DiscoveryFilter {
    fn from(config: &ScanConfig) -> Self {
        DiscoveryFilter::new(
            config.services.clone(),
            config.device,
            config.name.clone(),
        )
    }
}
