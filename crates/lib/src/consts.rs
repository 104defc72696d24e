//! Crate-wide constants.

pub const APP_NAME: &str = "burrow";

/// Version of the store layout, embedded in every padded store root.
pub const STORE_VERSION: &str = "3";

/// Subtree holding build directories.
pub const STORE_BUILD_TREE: &str = "b";

/// Subtree holding finished installations.
pub const STORE_INSTALL_TREE: &str = "i";

/// Subtree holding in-progress installations.
pub const STORE_STAGE_TREE: &str = "s";

/// Character used to pad store roots to a fixed length.
pub const STORE_PADDING_CHAR: char = '_';

/// Largest interpreter line the kernel reads from a `#!` script (Linux `BINPRM_BUF_SIZE - 1`).
pub const MAX_SHEBANG_LENGTH: usize = 127;

pub const SHEBANG_MARKER: &str = "#!";

/// Longest path a store root may be followed by inside a shebang line.
pub const STORE_LONGEST_SUFFIX: &str = "/i/ocaml-n.00.0000-########/bin/ocamlrun";

/// Per-sandbox metadata directory.
pub const SANDBOX_DIR: &str = "_burrow";

/// File inside an exported artifact naming the store root it was built against.
pub const STORE_PREFIX_FILE: &str = "storePrefix";

/// Build directory used by root packages with the `_build` build type.
pub const UNDERSCORE_BUILD_DIR: &str = "_build";

/// Environment variable that overrides the store prefix.
pub const PREFIX_ENV: &str = "BURROW_PREFIX";

/// Environment variable listing read-only import locations.
pub const IMPORT_PATH_ENV: &str = "BURROW_IMPORT_PATH";
