use crate::core::error::AndroshError;
use std::fmt;

/// Architectures a distro can be provisioned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    Aarch64,
    Armhf,
    X86,
    X86_64,
}

impl Arch {
    /// Map a host machine identifier (`uname -m`, an Android ABI name, or
    /// `std::env::consts::ARCH`) to a supported architecture.
    pub fn from_machine(machine: &str) -> Result<Self, AndroshError> {
        match machine.trim() {
            "arm64-v8a" | "aarch64" => Ok(Arch::Aarch64),
            "armeabi" | "armeabi-v7a" | "armhf" | "arm" | "armv7l" | "armv8l" => Ok(Arch::Armhf),
            "x86" | "i686" => Ok(Arch::X86),
            "x86_64" => Ok(Arch::X86_64),
            other => Err(AndroshError::Configuration(format!(
                "Unknown architecture: {:?}",
                other
            ))),
        }
    }

    /// Resolve from an explicit override, else the architecture this binary
    /// was built for.
    pub fn detect(machine_override: Option<&str>) -> Result<Self, AndroshError> {
        Self::from_machine(machine_override.unwrap_or(std::env::consts::ARCH))
    }

    /// Tag used by the distro mirror in release paths and file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::Aarch64 => "aarch64",
            Arch::Armhf => "armhf",
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
        }
    }

    /// Directory name of this architecture in the helper binaries repository.
    pub fn helper_dir(self) -> &'static str {
        match self {
            Arch::Armhf => "arm",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
