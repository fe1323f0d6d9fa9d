use rusoto_core::Region;

use crate::configuration::SetupError;

/// Resolves the S3 region for the run.
///
/// A custom `endpoint` (MinIO, Storj, ...) takes precedence over the region
/// name, which then only labels the signing region.
pub fn resolve_region(name: Option<&str>, endpoint: Option<&str>) -> Result<Region, SetupError> {
    if let Some(endpoint) = endpoint.filter(|e| !e.trim().is_empty()) {
        return Ok(Region::Custom {
            name: name.unwrap_or("us-east-1").to_string(),
            endpoint: endpoint.to_string(),
        });
    }

    let region = match name.unwrap_or("eu-central-1") {
        "ap-northeast-1" => Region::ApNortheast1,
        "ap-northeast-2" => Region::ApNortheast2,
        "ap-south-1" => Region::ApSouth1,
        "ap-southeast-1" => Region::ApSoutheast1,
        "ap-southeast-2" => Region::ApSoutheast2,
        "ca-central-1" => Region::CaCentral1,
        "cn-north-1" => Region::CnNorth1,
        "cn-northwest-1" => Region::CnNorthwest1,
        "eu-central-1" => Region::EuCentral1,
        "eu-north-1" => Region::EuNorth1,
        "eu-west-1" => Region::EuWest1,
        "eu-west-2" => Region::EuWest2,
        "eu-west-3" => Region::EuWest3,
        "sa-east-1" => Region::SaEast1,
        "us-east-1" => Region::UsEast1,
        "us-east-2" => Region::UsEast2,
        "us-gov-west-1" => Region::UsGovWest1,
        "us-west-1" => Region::UsWest1,
        "us-west-2" => Region::UsWest2,
        "storj-eu1" => Region::Custom {
            name: "StorjEu1".to_string(),
            endpoint: "https://gateway.storjshare.io".to_string(),
        },
        region => return Err(SetupError::InvalidRegion(region.to_string())),
    };

    Ok(region)
}
