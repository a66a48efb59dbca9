use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

type BoxStr = Box<str>;

/// Shared SwitchBot API credential pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: BoxStr,
    pub secret: BoxStr,
}

impl Credentials {
    pub fn new(token: impl Into<BoxStr>, secret: impl Into<BoxStr>) -> Self {
        Self {
            token: token.into(),
            secret: secret.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.token.is_empty() && !self.secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Profile-specific measurement carried on top of temperature and humidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileField {
    Battery,
    Co2,
}

/// Hardware profile of a polled device. Names match the upstream `deviceType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceProfile {
    MeterPro,
    WoIOSensor,
}

impl DeviceProfile {
    pub const ALL: [DeviceProfile; 2] = [DeviceProfile::MeterPro, DeviceProfile::WoIOSensor];

    /// Optional measurements this profile reports.
    pub fn fields(self) -> &'static [ProfileField] {
        match self {
            DeviceProfile::MeterPro => &[ProfileField::Co2],
            DeviceProfile::WoIOSensor => &[ProfileField::Battery],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceProfile::MeterPro => "MeterPro",
            DeviceProfile::WoIOSensor => "WoIOSensor",
        }
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProfile(pub BoxStr);

impl fmt::Display for UnknownProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown device profile: {}", self.0)
    }
}

impl std::error::Error for UnknownProfile {}

impl FromStr for DeviceProfile {
    type Err = UnknownProfile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceProfile::ALL
            .into_iter()
            .find(|profile| profile.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownProfile(s.into()))
    }
}

/// A device status URL and the profile its payload follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: BoxStr,
    pub profile: DeviceProfile,
}

impl Endpoint {
    pub fn new(url: impl Into<BoxStr>, profile: DeviceProfile) -> Self {
        Self {
            url: url.into(),
            profile,
        }
    }
}

/// Canonical, profile-agnostic reading.
///
/// Measurements are `None` when the device did not report them, which keeps
/// "no CO2 sensor" apart from "CO2 reading of zero".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub device_id: BoxStr,
    pub device_type: BoxStr,
    pub hub_device_id: BoxStr,
    pub version: BoxStr,
    pub temperature: Option<f64>,
    pub humidity: Option<i64>,
    pub battery: Option<i64>,
    pub co2: Option<i64>,
    /// Collection time; the upstream API carries no sample timestamp.
    pub observed_at: jiff::Timestamp,
}

impl Sample {
    pub fn has_measurements(&self) -> bool {
        self.temperature.is_some()
            || self.humidity.is_some()
            || self.battery.is_some()
            || self.co2.is_some()
    }
}
