use crate::core::{ResourceType, ZombieResource};

const CONSOLE_BASE: &str = "https://console.cloud.google.com";

pub fn console_url(
    resource_type: ResourceType,
    project_id: &str,
    zone: Option<&str>,
    name: Option<&str>,
) -> String {
    let project_id = project_id.trim();
    let zone = zone.map(str::trim).filter(|z| !z.is_empty());
    let name = name.map(str::trim).filter(|n| !n.is_empty());

    match resource_type {
        ResourceType::GceInstance => match (zone, name) {
            (Some(zone), Some(name)) => format!(
                "{CONSOLE_BASE}/compute/instancesDetail/zones/{zone}/instances/{name}?project={project_id}"
            ),
            _ => format!("{CONSOLE_BASE}/compute/instances?project={project_id}"),
        },
        ResourceType::Disk => format!("{CONSOLE_BASE}/compute/disks?project={project_id}"),
        ResourceType::IpAddress => {
            format!("{CONSOLE_BASE}/networking/addresses/list?project={project_id}")
        }
        ResourceType::Other => format!("{CONSOLE_BASE}/home/dashboard?project={project_id}"),
    }
}

pub fn zombie_console_url(zombie: &ZombieResource, project_id: &str, fallback_zone: &str) -> String {
    console_url(
        zombie.resource_type,
        project_id,
        Some(zombie.zone_or(fallback_zone)),
        Some(zombie.name.as_str()),
    )
}
