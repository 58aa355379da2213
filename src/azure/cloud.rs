//! Azure cloud environments

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sovereign cloud the subscription lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CloudEnvironment {
    #[default]
    Public,
    China,
    #[value(name = "usgovernment")]
    UsGovernment,
}

impl CloudEnvironment {
    /// Azure Resource Manager endpoint
    pub fn resource_manager_endpoint(&self) -> &'static str {
        match self {
            CloudEnvironment::Public => "https://management.azure.com",
            CloudEnvironment::China => "https://management.chinacloudapi.cn",
            CloudEnvironment::UsGovernment => "https://management.usgovcloudapi.net",
        }
    }

    /// Token audience for Resource Manager
    pub fn audience(&self) -> &'static str {
        match self {
            CloudEnvironment::Public => "https://management.core.windows.net/",
            CloudEnvironment::China => "https://management.core.chinacloudapi.cn/",
            CloudEnvironment::UsGovernment => "https://management.core.usgovcloudapi.net/",
        }
    }

    /// Microsoft Entra login authority host
    pub fn authority_host(&self) -> &'static str {
        match self {
            CloudEnvironment::Public => "https://login.microsoftonline.com",
            CloudEnvironment::China => "https://login.chinacloudapi.cn",
            CloudEnvironment::UsGovernment => "https://login.microsoftonline.us",
        }
    }
}

impl fmt::Display for CloudEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloudEnvironment::Public => "public",
            CloudEnvironment::China => "china",
            CloudEnvironment::UsGovernment => "usgovernment",
        };
        f.write_str(name)
    }
}
