//! System-wide constants and default names.

/// Binary name, also stamped into rendered recipes.
pub const BIN_NAME: &str = "vresolve";

/// Origin name given to the base definition.
pub const BASE_ORIGIN: &str = "base";

/// Environment variable the entrypoint script reads the server config path from.
pub const CONFIG_FILE_VAR: &str = "OPTIMADE_CONFIG_FILE";

/// Environment variable the entrypoint script reads the index links path from.
pub const INDEX_LINKS_VAR: &str = "OPTIMADE_INDEX_LINKS_PATH";

/// Variables that must hold absolute paths in the runtime contract.
pub const DEFAULT_ABSOLUTE_PATH_VARS: &[&str] = &[CONFIG_FILE_VAR, INDEX_LINKS_VAR];

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "VRESOLVE_CONFIG";

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Upper bound on the size of a single COPY source hashed for content identity.
pub const MAX_DIGEST_BYTES: u64 = 64 * 1024 * 1024;
