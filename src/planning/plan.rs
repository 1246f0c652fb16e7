use ipnet::IpNet;

use super::error::{PlanError, Result};
use super::prefix::parse_network;
use crate::models::{AddressFamily, CreatePlanRequest, Plan};

/// Check the plan invariants on raw request fields
pub fn validate_plan_fields(prefix: &str, mask_len: u8) -> Result<IpNet> {
    let network = parse_network(prefix)?;
    let canonical = network.trunc().to_string();
    if canonical != prefix {
        return Err(PlanError::malformed(format!(
            "plan prefix '{}' is not canonical (expected '{}')",
            prefix, canonical
        )));
    }

    if network.prefix_len() >= mask_len {
        return Err(PlanError::malformed(format!(
            "plan mask length /{} must be deeper than {}",
            mask_len, prefix
        )));
    }

    let limit = AddressFamily::of(&network).max_mask_len();
    if mask_len > limit {
        return Err(PlanError::capacity(format!(
            "plan mask length /{} exceeds the /{} limit for {}",
            mask_len, limit, prefix
        )));
    }

    Ok(network)
}

impl CreatePlanRequest {
    pub fn validate(&self) -> Result<()> {
        validate_plan_fields(&self.prefix, self.mask_len).map(|_| ())
    }
}

impl Plan {
    pub fn validate(&self) -> Result<()> {
        validate_plan_fields(&self.prefix, self.mask_len).map(|_| ())
    }

    pub fn network(&self) -> Result<IpNet> {
        parse_network(&self.prefix)
    }

    pub fn family(&self) -> Result<AddressFamily> {
        Ok(AddressFamily::of(&self.network()?))
    }

    /// Mask length of the plan's own block
    pub fn base_len(&self) -> Result<u8> {
        Ok(self.network()?.prefix_len())
    }

    /// Bits available between the plan's block and its deepest mask length
    pub fn allowed_bits(&self) -> Result<u32> {
        let base = self.base_len()?;
        Ok(u32::from(self.mask_len.saturating_sub(base)))
    }
}
