// NA Manager - Validation Utilities
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Input validation for user-supplied IP settings.
//!
//! Validation happens before any OS call; a request that fails here never
//! reaches adapter control.

use std::net::Ipv4Addr;
use std::str::FromStr;

use super::error::{Error, Result};

/// Validate an IPv4 address string.
pub fn validate_ipv4(s: &str) -> Result<Ipv4Addr> {
    Ipv4Addr::from_str(s.trim()).map_err(|_| Error::InvalidIpAddress(s.to_string()))
}

/// Validate an optional IPv4 field: blank is accepted and yields `None`.
pub fn validate_optional_ipv4(s: &str) -> Result<Option<Ipv4Addr>> {
    if s.trim().is_empty() {
        Ok(None)
    } else {
        validate_ipv4(s).map(Some)
    }
}

/// Validate a dotted subnet mask: contiguous ones followed by zeros.
pub fn validate_subnet_mask(s: &str) -> Result<Ipv4Addr> {
    let mask = Ipv4Addr::from_str(s.trim()).map_err(|_| Error::InvalidSubnetMask(s.to_string()))?;
    let bits = u32::from(mask);
    if bits == 0 || bits.leading_ones() + bits.trailing_zeros() != 32 {
        return Err(Error::InvalidSubnetMask(s.to_string()));
    }
    Ok(mask)
}

/// Convert a mask to its prefix length.
pub fn mask_to_prefix(mask: Ipv4Addr) -> u8 {
    u32::from(mask).leading_ones() as u8
}

/// Validated static IPv4 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIpRequest {
    pub ip_address: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub gateway: Option<Ipv4Addr>,
    pub preferred_dns: Option<Ipv4Addr>,
    pub alternate_dns: Option<Ipv4Addr>,
}

impl StaticIpRequest {
    /// Validate raw text fields. IP and mask are required, the rest optional.
    pub fn parse(
        ip_address: &str,
        subnet_mask: &str,
        gateway: &str,
        preferred_dns: &str,
        alternate_dns: &str,
    ) -> Result<Self> {
        let request = Self {
            ip_address: validate_ipv4(ip_address)?,
            subnet_mask: validate_subnet_mask(subnet_mask)?,
            gateway: validate_optional_ipv4(gateway)?,
            preferred_dns: validate_optional_ipv4(preferred_dns)?,
            alternate_dns: validate_optional_ipv4(alternate_dns)?,
        };

        if request.alternate_dns.is_some() && request.preferred_dns.is_none() {
            return Err(Error::Configuration(
                "Alternate DNS requires a preferred DNS server".to_string(),
            ));
        }

        if let Some(gateway) = request.gateway {
            let mask = u32::from(request.subnet_mask);
            if u32::from(gateway) & mask != u32::from(request.ip_address) & mask {
                return Err(Error::Configuration(format!(
                    "Gateway {} is outside the {}/{} subnet",
                    gateway,
                    request.ip_address,
                    mask_to_prefix(request.subnet_mask)
                )));
            }
        }

        Ok(request)
    }

    /// Render an optional address as the text the control layer takes.
    pub fn text(addr: Option<Ipv4Addr>) -> String {
        addr.map(|a| a.to_string()).unwrap_or_default()
    }
}

/// Validate a profile name.
pub fn validate_profile_name(s: &str) -> Result<String> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::Configuration("Profile name cannot be empty".to_string()));
    }
    if s.len() > 100 {
        return Err(Error::Configuration(
            "Profile name must be 100 characters or less".to_string(),
        ));
    }
    Ok(s.to_string())
}
