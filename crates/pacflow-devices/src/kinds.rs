/*!
 * The closed set of controller data kinds a node can target.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// A kind of controller data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataKind {
    /// Controller details (`/device`)
    DeviceInfo,
    /// Strategy details (`/device/strategy`)
    StrategyInfo,
    /// Digital input point state
    DigInput,
    /// Digital output point state
    DigOutput,
    /// Analog input point value in engineering units
    AnaInput,
    /// Analog output point value in engineering units
    AnaOutput,
    /// 32-bit integer variable
    Int32Variable,
    /// 64-bit integer variable, transferred as a decimal string
    Int64Variable,
    /// Float variable
    FloatVariable,
    /// String variable
    StringVariable,
    /// Down timer
    DownTimerVariable,
    /// Up timer
    UpTimerVariable,
    /// 32-bit integer table
    Int32Table,
    /// 64-bit integer table, transferred as decimal strings
    Int64Table,
    /// Float table
    FloatTable,
    /// String table
    StringTable,
}

impl DataKind {
    /// Every kind, in declaration order
    pub const ALL: [DataKind; 16] = [
        DataKind::DeviceInfo,
        DataKind::StrategyInfo,
        DataKind::DigInput,
        DataKind::DigOutput,
        DataKind::AnaInput,
        DataKind::AnaOutput,
        DataKind::Int32Variable,
        DataKind::Int64Variable,
        DataKind::FloatVariable,
        DataKind::StringVariable,
        DataKind::DownTimerVariable,
        DataKind::UpTimerVariable,
        DataKind::Int32Table,
        DataKind::Int64Table,
        DataKind::FloatTable,
        DataKind::StringTable,
    ];

    /// The configuration name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::DeviceInfo => "device-info",
            DataKind::StrategyInfo => "strategy-info",
            DataKind::DigInput => "dig-input",
            DataKind::DigOutput => "dig-output",
            DataKind::AnaInput => "ana-input",
            DataKind::AnaOutput => "ana-output",
            DataKind::Int32Variable => "int32-variable",
            DataKind::Int64Variable => "int64-variable",
            DataKind::FloatVariable => "float-variable",
            DataKind::StringVariable => "string-variable",
            DataKind::DownTimerVariable => "down-timer-variable",
            DataKind::UpTimerVariable => "up-timer-variable",
            DataKind::Int32Table => "int32-table",
            DataKind::Int64Table => "int64-table",
            DataKind::FloatTable => "float-table",
            DataKind::StringTable => "string-table",
        }
    }

    /// Whether the kind is a table
    pub fn is_table(&self) -> bool {
        matches!(
            self,
            DataKind::Int32Table | DataKind::Int64Table | DataKind::FloatTable | DataKind::StringTable
        )
    }

    /// Whether the kind is controller or strategy metadata
    pub fn is_metadata(&self) -> bool {
        matches!(self, DataKind::DeviceInfo | DataKind::StrategyInfo)
    }

    /// Whether a write node can target the kind
    pub fn is_writable(&self) -> bool {
        matches!(
            self,
            DataKind::DigOutput
                | DataKind::AnaOutput
                | DataKind::Int32Variable
                | DataKind::Int64Variable
                | DataKind::FloatVariable
                | DataKind::StringVariable
                | DataKind::Int32Table
                | DataKind::Int64Table
                | DataKind::FloatTable
                | DataKind::StringTable
        )
    }

    /// Whether an input node can scan the kind
    pub fn is_scannable(&self) -> bool {
        !self.is_metadata() && !matches!(self, DataKind::DownTimerVariable | DataKind::UpTimerVariable)
    }

    /// Whether value changes are judged against a numeric deadband
    pub fn uses_deadband(&self) -> bool {
        matches!(
            self,
            DataKind::Int32Variable
                | DataKind::FloatVariable
                | DataKind::AnaInput
                | DataKind::AnaOutput
                | DataKind::Int32Table
                | DataKind::FloatTable
        )
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DeviceError::configuration(format!("Unknown data type '{}'", s)))
    }
}
