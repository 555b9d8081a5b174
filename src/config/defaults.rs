//! Default configuration values

/// Maximum number of download retry attempts
pub const MAX_DOWNLOAD_RETRIES: u32 = 3;

/// Name of the work directory created under the current directory
pub const WORK_DIR_NAME: &str = "openwrt-composer";

/// Default timeout for a single Image Builder run (in seconds)
pub const BUILD_TIMEOUT_SECS: u64 = 2 * 60 * 60;

/// Default configuration-generation program
pub const NETJSONCONFIG_COMMAND: &str = "netjsonconfig";

/// Backend identifier handed to the configuration generator
pub const CONFIG_BACKEND: &str = "openwrt";

/// Prefix for environment variable overrides of the tool config
pub const ENV_PREFIX: &str = "OPENWRT_COMPOSER_";

/// Tag of the image every builder image derives from
pub const BASE_IMAGE_TAG: &str = "openwrt-composer-base";

/// Distribution image the base image is built from
pub const BASE_IMAGE_FROM: &str = "fedora:39";

/// Where the firmware output directory is mounted inside the container
pub const CONTAINER_RESULT_DIR: &str = "/openwrt/result";

/// Where the staged files directory is mounted inside the container
pub const CONTAINER_FILES_DIR: &str = "/openwrt/files";

/// Host platform suffix of Image Builder archives
pub const IMAGE_BUILDER_HOST: &str = "Linux-x86_64";
