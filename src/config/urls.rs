//! Upstream download locations

/// OpenWRT download server, root of `releases/<version>/targets/...`
pub const OPENWRT_DOWNLOADS: &str = "https://downloads.openwrt.org/";

/// Name of the checksum listing published next to release artifacts
pub const SHA256SUMS_FILE: &str = "sha256sums";
