//! Alibaba Cloud services reachable through POP RPC

use serde::Deserialize;
use std::fmt;

/// An Alibaba Cloud product API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Ecs,
    Vpc,
    Ram,
    Sts,
    Slb,
    Rds,
    Kms,
    ActionTrail,
    Cms,
    Autoscaling,
}

impl Service {
    /// Name used in logs and error messages
    pub fn name(self) -> &'static str {
        match self {
            Service::Ecs => "EcsService",
            Service::Vpc => "VpcService",
            Service::Ram => "RamService",
            Service::Sts => "StsService",
            Service::Slb => "SlbService",
            Service::Rds => "RdsService",
            Service::Kms => "KmsService",
            Service::ActionTrail => "ActionTrailService",
            Service::Cms => "CmsService",
            Service::Autoscaling => "AutoscalingService",
        }
    }

    /// Product code used in AKA identifiers
    pub fn product(self) -> &'static str {
        match self {
            Service::Ecs => "ecs",
            Service::Vpc => "vpc",
            Service::Ram => "ram",
            Service::Sts => "sts",
            Service::Slb => "slb",
            Service::Rds => "rds",
            Service::Kms => "kms",
            Service::ActionTrail => "actiontrail",
            Service::Cms => "cms",
            Service::Autoscaling => "ess",
        }
    }

    /// RPC API version
    pub fn api_version(self) -> &'static str {
        match self {
            Service::Ecs => "2014-05-26",
            Service::Vpc => "2016-04-28",
            Service::Ram => "2015-05-01",
            Service::Sts => "2015-04-01",
            Service::Slb => "2014-05-15",
            Service::Rds => "2014-08-15",
            Service::Kms => "2016-01-20",
            Service::ActionTrail => "2020-07-06",
            Service::Cms => "2019-01-01",
            Service::Autoscaling => "2014-08-28",
        }
    }

    /// Global services are served from a single endpoint and take no `RegionId`
    pub fn is_regional(self) -> bool {
        !matches!(self, Service::Ram | Service::Sts)
    }

    /// HTTPS endpoint for a region
    pub fn endpoint(self, region: &str) -> String {
        match self {
            Service::Ram => "https://ram.aliyuncs.com".to_string(),
            Service::Sts => "https://sts.aliyuncs.com".to_string(),
            Service::Rds => "https://rds.aliyuncs.com".to_string(),
            Service::Autoscaling => "https://ess.aliyuncs.com".to_string(),
            Service::Cms => format!("https://metrics.{}.aliyuncs.com", region),
            _ => format!("https://{}.{}.aliyuncs.com", self.product(), region),
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints() {
        assert_eq!(Service::Ecs.endpoint("cn-beijing"), "https://ecs.cn-beijing.aliyuncs.com");
        assert_eq!(Service::Cms.endpoint("cn-beijing"), "https://metrics.cn-beijing.aliyuncs.com");
        assert_eq!(Service::Ram.endpoint("cn-beijing"), "https://ram.aliyuncs.com");
    }

    #[test]
    fn test_deserialize_from_registry_name() {
        let service: Service = serde_json::from_str("\"actiontrail\"").unwrap();
        assert_eq!(service, Service::ActionTrail);
        let service: Service = serde_json::from_str("\"autoscaling\"").unwrap();
        assert_eq!(service.name(), "AutoscalingService");
    }
}
