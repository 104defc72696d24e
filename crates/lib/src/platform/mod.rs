//! The platform tasks are compiled for.
//!
//! Expressions can read it through the `os` and `arch` names, and it picks
//! the delimiter joining list-valued variables such as `PATH`.

pub mod paths;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  Darwin,
  Windows,
  Unknown,
}

impl Os {
  pub fn host() -> Self {
    match std::env::consts::OS {
      "linux" => Self::Linux,
      "macos" => Self::Darwin,
      "windows" => Self::Windows,
      _ => Self::Unknown,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::Darwin => "darwin",
      Self::Windows => "windows",
      Self::Unknown => "unknown",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86,
  X86_64,
  Arm64,
  Unknown,
}

impl Arch {
  pub fn host() -> Self {
    match std::env::consts::ARCH {
      "x86" => Self::X86,
      "x86_64" => Self::X86_64,
      "aarch64" => Self::Arm64,
      _ => Self::Unknown,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::X86 => "x86",
      Self::X86_64 => "x86_64",
      Self::Arm64 => "arm64",
      Self::Unknown => "unknown",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub os: Os,
  pub arch: Arch,
}

impl Platform {
  pub fn new(os: Os, arch: Arch) -> Self {
    Self { os, arch }
  }

  /// The machine burrow is running on.
  pub fn host() -> Self {
    Self::new(Os::host(), Arch::host())
  }

  /// Separator between entries of list-valued variables.
  ///
  /// Only the OS decides it, never the variable name.
  pub fn path_delimiter(&self) -> &'static str {
    match self.os {
      Os::Windows => ";",
      _ => ":",
    }
  }

  /// Separator between path components in rendered values.
  pub fn path_separator(&self) -> &'static str {
    "/"
  }
}

impl Default for Platform {
  fn default() -> Self {
    Self::host()
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
  }
}
