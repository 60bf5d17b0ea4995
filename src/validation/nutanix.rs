use crate::{
    field::{Error, ErrorList, Path},
    types::nutanix::{BootType, GpuIdentifierType, IdentifierType, MachinePool, Platform, PrismEndpoint, StorageResourceReference},
    validate,
};
use std::{collections::BTreeSet, str::FromStr};
use strum::IntoEnumIterator;

const MIN_MEMORY_MIB: i64 = 2048;
const MIN_DATA_DISK_SIZE_BYTES: i64 = 1 << 30;

pub(crate) fn validate_platform(p: &Platform, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    let prism_central_path = path.child("prismCentral");
    all_errs.extend(validate_endpoint(&p.prism_central.endpoint, "Prism Central", &prism_central_path.child("endpoint")));
    if p.prism_central.username.is_empty() {
        all_errs.push(Error::required(
            prism_central_path.child("username"),
            "must specify the Prism Central username",
        ));
    }
    if p.prism_central.password.is_empty() {
        all_errs.push(Error::required(
            prism_central_path.child("password"),
            "must specify the Prism Central password",
        ));
    }

    if p.prism_elements.is_empty() {
        all_errs.push(Error::required(path.child("prismElements"), "must specify one Prism Element"));
    }
    for (i, prism_element) in p.prism_elements.iter().enumerate() {
        let pe_path = path.child("prismElements").index(i);
        if prism_element.uuid.is_empty() {
            all_errs.push(Error::required(pe_path.child("uuid"), "must specify the Prism Element UUID"));
        }
        all_errs.extend(validate_endpoint(&prism_element.endpoint, "Prism Element", &pe_path.child("endpoint")));
    }

    all_errs.extend(validate_subnet_uuids(&p.subnet_uuids, &path.child("subnetUUIDs")));

    if !p.cluster_os_image.is_empty() {
        if let Err(err) = validate::uri(&p.cluster_os_image, &["http", "https"]) {
            all_errs.push(Error::invalid(
                path.child("clusterOSImage"),
                p.cluster_os_image.as_str(),
                format!("{:#}", err),
            ));
        }
    }

    let mut failure_domain_names = BTreeSet::new();
    for (i, failure_domain) in p.failure_domains.iter().enumerate() {
        let fd_path = path.child("failureDomains").index(i);

        if failure_domain.name.is_empty() {
            all_errs.push(Error::required(fd_path.child("name"), "failure domain name is required"));
        } else if !failure_domain_names.insert(failure_domain.name.as_str()) {
            all_errs.push(Error::duplicate(fd_path.child("name"), failure_domain.name.as_str()));
        }

        if failure_domain.prism_element.uuid.is_empty() {
            all_errs.push(Error::required(
                fd_path.child("prismElement").child("uuid"),
                "must specify the Prism Element UUID",
            ));
        }

        all_errs.extend(validate_subnet_uuids(&failure_domain.subnet_uuids, &fd_path.child("subnetUUIDs")));

        for (j, storage_container) in failure_domain.storage_containers.iter().enumerate() {
            all_errs.extend(validate_storage_reference(storage_container, true, &fd_path.child("storageContainers").index(j)));
        }
        for (j, data_source_image) in failure_domain.data_source_images.iter().enumerate() {
            all_errs.extend(validate_storage_reference(data_source_image, true, &fd_path.child("dataSourceImages").index(j)));
        }
    }

    if let Some(default_machine_platform) = &p.default_machine_platform {
        all_errs.extend(validate_machine_pool(default_machine_platform, &path.child("defaultMachinePlatform"), p));
    }

    all_errs
}

fn validate_endpoint(endpoint: &PrismEndpoint, what: &str, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    if endpoint.address.is_empty() {
        all_errs.push(Error::required(
            path.child("address"),
            format!("must specify the {} endpoint address", what),
        ));
    } else if let Err(err) = validate::host(&endpoint.address) {
        all_errs.push(Error::invalid(path.child("address"), endpoint.address.as_str(), format!("{:#}", err)));
    }

    if validate::port(endpoint.port).is_err() {
        all_errs.push(Error::invalid(
            path.child("port"),
            endpoint.port,
            format!("The {} endpoint port is invalid, must be in the range of 1 to 65535", what),
        ));
    }

    all_errs
}

/// Machines get exactly one NIC, so exactly one subnet
fn validate_subnet_uuids(subnet_uuids: &[String], path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    match subnet_uuids.len() {
        0 => all_errs.push(Error::required(path.clone(), "must specify at least one subnet")),
        1 => {}
        n => all_errs.push(Error::too_many(path.clone(), n, 1)),
    }

    for (i, subnet_uuid) in subnet_uuids.iter().enumerate() {
        if subnet_uuid.is_empty() {
            all_errs.push(Error::required(path.index(i), "subnet UUID must not be empty"));
        }
    }

    all_errs
}

fn validate_storage_reference(reference: &StorageResourceReference, needs_reference_name: bool, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    if needs_reference_name && reference.reference_name.is_empty() {
        all_errs.push(Error::required(path.child("referenceName"), "referenceName is required"));
    }
    if reference.uuid.is_empty() && reference.name.is_empty() {
        all_errs.push(Error::required(path.clone(), "must specify the resource uuid or name"));
    }

    all_errs
}

/// Checks the CPU layout a pool ends up with once role defaults and defaultMachinePlatform are
/// layered under it. Machines get `cpus / coresPerSocket` sockets, which must be a whole number of
/// at least one.
pub(crate) fn validate_cpu_topology(effective: &MachinePool, path: &Path) -> ErrorList {
    let mut all_errs = ErrorList::new();

    let (cpus, cores_per_socket) = (effective.num_cpus, effective.num_cores_per_socket);
    if cpus <= 0 || cores_per_socket <= 0 {
        return all_errs;
    }

    if cores_per_socket > cpus {
        all_errs.push(Error::invalid(
            path.child("coresPerSocket"),
            cores_per_socket,
            format!("cores per socket must be less than number of CPUs ({} with defaults applied)", cpus),
        ));
    } else if cpus % cores_per_socket != 0 {
        all_errs.push(Error::invalid(
            path.child("cpus"),
            cpus,
            format!("number of CPUs must be a multiple of cores per socket ({})", cores_per_socket),
        ));
    }

    all_errs
}

pub(crate) fn validate_machine_pool(pool: &MachinePool, path: &Path, platform: &Platform) -> ErrorList {
    let mut all_errs = ErrorList::new();

    for (value, field) in [
        (pool.num_cpus, "cpus"),
        (pool.num_cores_per_socket, "coresPerSocket"),
        (pool.memory_mib, "memoryMiB"),
    ] {
        if value < 0 {
            all_errs.push(Error::invalid(path.child(field), value, format!("{} must be positive", field)));
        }
    }
    if pool.os_disk.disk_size_gib < 0 {
        all_errs.push(Error::invalid(
            path.child("osDisk").child("diskSizeGiB"),
            pool.os_disk.disk_size_gib,
            "storage disk size must be positive",
        ));
    }

    if pool.num_cores_per_socket > 0 && pool.num_cpus > 0 && pool.num_cores_per_socket > pool.num_cpus {
        all_errs.push(Error::invalid(
            path.child("coresPerSocket"),
            pool.num_cores_per_socket,
            "cores per socket must be less than number of CPUs",
        ));
    }

    if pool.memory_mib > 0 && pool.memory_mib < MIN_MEMORY_MIB {
        all_errs.push(Error::invalid(
            path.child("memoryMiB"),
            pool.memory_mib,
            format!("memory size must be at least {} MiB", MIN_MEMORY_MIB),
        ));
    }

    if !pool.boot_type.is_empty() && BootType::from_str(&pool.boot_type).is_err() {
        all_errs.push(Error::not_supported(
            path.child("bootType"),
            pool.boot_type.as_str(),
            &BootType::iter().map(|boot_type| boot_type.to_string()).collect::<Vec<_>>(),
        ));
    }

    if let Some(project) = &pool.project {
        let project_path = path.child("project");
        match IdentifierType::from_str(&project.identifier_type) {
            Ok(IdentifierType::Name) if project.name.as_deref().unwrap_or_default().is_empty() => {
                all_errs.push(Error::required(project_path.child("name"), "missing project name"))
            }
            Ok(IdentifierType::Uuid) if project.uuid.as_deref().unwrap_or_default().is_empty() => {
                all_errs.push(Error::required(project_path.child("uuid"), "missing project uuid"))
            }
            Ok(_) => {}
            Err(_) => all_errs.push(Error::not_supported(
                project_path.child("type"),
                project.identifier_type.as_str(),
                &IdentifierType::iter().map(|t| t.to_string()).collect::<Vec<_>>(),
            )),
        }
    }

    for (i, category) in pool.categories.iter().enumerate() {
        let category_path = path.child("categories").index(i);
        if category.key.is_empty() {
            all_errs.push(Error::required(category_path.child("key"), "category key must not be empty"));
        }
        if category.value.is_empty() {
            all_errs.push(Error::required(category_path.child("value"), "category value must not be empty"));
        }
    }

    for (i, gpu) in pool.gpus.iter().enumerate() {
        let gpu_path = path.child("gpus").index(i);
        let has_name = gpu.name.as_deref().is_some_and(|name| !name.is_empty());
        let has_device_id = gpu.device_id.is_some_and(|device_id| device_id > 0);

        if has_name && has_device_id {
            all_errs.push(Error::invalid(
                gpu_path.clone(),
                gpu.gpu_type.as_str(),
                "only one of the GPU name or deviceID may be set",
            ));
            continue;
        }

        match GpuIdentifierType::from_str(&gpu.gpu_type) {
            Ok(GpuIdentifierType::Name) if !has_name => {
                all_errs.push(Error::required(gpu_path.child("name"), "missing GPU name"))
            }
            Ok(GpuIdentifierType::DeviceId) if !has_device_id => {
                all_errs.push(Error::required(gpu_path.child("deviceID"), "missing GPU deviceID"))
            }
            Ok(_) => {}
            Err(_) => all_errs.push(Error::not_supported(
                gpu_path.child("type"),
                gpu.gpu_type.as_str(),
                &GpuIdentifierType::iter().map(|t| t.to_string()).collect::<Vec<_>>(),
            )),
        }
    }

    for (i, data_disk) in pool.data_disks.iter().enumerate() {
        let disk_path = path.child("dataDisks").index(i);
        if data_disk.disk_size < MIN_DATA_DISK_SIZE_BYTES {
            all_errs.push(Error::invalid(
                disk_path.child("diskSize"),
                data_disk.disk_size,
                "The minimum diskSize is 1Gi bytes",
            ));
        }
        if let Some(data_source_image) = &data_disk.data_source_image {
            all_errs.extend(validate_storage_reference(data_source_image, false, &disk_path.child("dataSourceImage")));
        }
    }

    let mut referenced = BTreeSet::new();
    for (i, name) in pool.failure_domains.iter().enumerate() {
        let fd_path = path.child("failureDomains").index(i);
        if !referenced.insert(name.as_str()) {
            all_errs.push(Error::duplicate(fd_path, name.as_str()));
        } else if platform.failure_domain(name).is_none() {
            all_errs.push(Error::invalid(
                fd_path,
                name.as_str(),
                "The failure domain is not defined in the platform failure domains",
            ));
        }
    }

    all_errs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        nutanix::{DataDisk, FailureDomain, Gpu, ResourceIdentifier},
        tests::nutanix_install_config,
    };

    fn platform() -> Platform {
        nutanix_install_config().platform.nutanix.unwrap()
    }

    fn errors(list: ErrorList) -> Vec<String> {
        list.iter().map(|err| err.to_string()).collect()
    }

    fn path() -> Path {
        Path::new("platform").child("nutanix")
    }

    #[test]
    fn test_valid_platform() {
        assert_eq!(errors(validate_platform(&platform(), &path())), Vec::<String>::new());
    }

    #[test]
    fn test_prism_central() {
        let mut p = platform();
        p.prism_central.endpoint.address = String::new();
        p.prism_central.endpoint.port = 70000;
        p.prism_central.username = String::new();
        assert_eq!(
            errors(validate_platform(&p, &path())),
            vec![
                "platform.nutanix.prismCentral.endpoint.address: Required value: must specify the Prism Central endpoint address",
                "platform.nutanix.prismCentral.endpoint.port: Invalid value: 70000: The Prism Central endpoint port is invalid, must be in the range of 1 to 65535",
                "platform.nutanix.prismCentral.username: Required value: must specify the Prism Central username",
            ]
        );
    }

    #[test]
    fn test_prism_elements_and_subnets() {
        let mut p = platform();
        p.prism_elements = vec![];
        p.subnet_uuids = vec![];
        assert_eq!(
            errors(validate_platform(&p, &path())),
            vec![
                "platform.nutanix.prismElements: Required value: must specify one Prism Element",
                "platform.nutanix.subnetUUIDs: Required value: must specify at least one subnet",
            ]
        );

        let mut p = platform();
        p.subnet_uuids.push(String::new());
        assert_eq!(
            errors(validate_platform(&p, &path())),
            vec![
                "platform.nutanix.subnetUUIDs: Too many: 2: must have at most 1 items",
                "platform.nutanix.subnetUUIDs[1]: Required value: subnet UUID must not be empty",
            ]
        );
    }

    #[test]
    fn test_cluster_os_image() {
        let mut p = platform();
        p.cluster_os_image = "https://mirror.example.com/rhcos-nutanix.qcow2".to_string();
        assert!(validate_platform(&p, &path()).is_empty());

        p.cluster_os_image = "ftp://mirror.example.com/rhcos-nutanix.qcow2".to_string();
        assert_eq!(validate_platform(&p, &path()).len(), 1);
    }

    #[test]
    fn test_failure_domains() {
        let mut p = platform();
        p.failure_domains.push(FailureDomain {
            name: "fd-a".to_string(),
            ..Default::default()
        });
        p.failure_domains[0].storage_containers.push(StorageResourceReference {
            reference_name: "sc".to_string(),
            ..Default::default()
        });

        assert_eq!(
            errors(validate_platform(&p, &path())),
            vec![
                "platform.nutanix.failureDomains[0].storageContainers[0]: Required value: must specify the resource uuid or name",
                r#"platform.nutanix.failureDomains[2].name: Duplicate value: "fd-a""#,
                "platform.nutanix.failureDomains[2].prismElement.uuid: Required value: must specify the Prism Element UUID",
                "platform.nutanix.failureDomains[2].subnetUUIDs: Required value: must specify at least one subnet",
            ]
        );
    }

    #[test]
    fn test_machine_pool_sizes() {
        let pool = MachinePool {
            num_cpus: 2,
            num_cores_per_socket: 4,
            memory_mib: 1024,
            os_disk: crate::types::nutanix::OsDisk { disk_size_gib: -1 },
            boot_type: "BIOS".to_string(),
            ..Default::default()
        };

        assert_eq!(
            errors(validate_machine_pool(&pool, &Path::new("pool"), &platform())),
            vec![
                "pool.osDisk.diskSizeGiB: Invalid value: -1: storage disk size must be positive",
                "pool.coresPerSocket: Invalid value: 4: cores per socket must be less than number of CPUs",
                "pool.memoryMiB: Invalid value: 1024: memory size must be at least 2048 MiB",
                r#"pool.bootType: Unsupported value: "BIOS": supported values: "Legacy", "UEFI", "SecureBoot""#,
            ]
        );

        let pool = MachinePool {
            num_cpus: 4,
            num_cores_per_socket: 4,
            ..Default::default()
        };
        assert!(validate_machine_pool(&pool, &Path::new("pool"), &platform()).is_empty());
    }

    #[test]
    fn test_cpu_topology() {
        let topology = |num_cpus, num_cores_per_socket| {
            errors(validate_cpu_topology(
                &MachinePool {
                    num_cpus,
                    num_cores_per_socket,
                    ..Default::default()
                },
                &Path::new("pool"),
            ))
        };

        assert!(topology(8, 1).is_empty());
        assert!(topology(8, 4).is_empty());
        assert!(topology(4, 4).is_empty());
        assert_eq!(
            topology(8, 16),
            vec!["pool.coresPerSocket: Invalid value: 16: cores per socket must be less than number of CPUs (8 with defaults applied)"]
        );
        assert_eq!(
            topology(6, 4),
            vec!["pool.cpus: Invalid value: 6: number of CPUs must be a multiple of cores per socket (4)"]
        );
    }

    #[test]
    fn test_machine_pool_references() {
        let pool = MachinePool {
            project: Some(ResourceIdentifier {
                identifier_type: "name".to_string(),
                ..Default::default()
            }),
            gpus: vec![
                Gpu {
                    gpu_type: "Name".to_string(),
                    name: Some("Tesla T4".to_string()),
                    device_id: None,
                },
                Gpu {
                    gpu_type: "DeviceID".to_string(),
                    name: None,
                    device_id: None,
                },
            ],
            data_disks: vec![DataDisk {
                disk_size: 512 << 20,
                ..Default::default()
            }],
            failure_domains: vec!["fd-a".to_string(), "fd-z".to_string(), "fd-a".to_string()],
            ..Default::default()
        };

        assert_eq!(
            errors(validate_machine_pool(&pool, &Path::new("pool"), &platform())),
            vec![
                "pool.project.name: Required value: missing project name",
                "pool.gpus[1].deviceID: Required value: missing GPU deviceID",
                "pool.dataDisks[0].diskSize: Invalid value: 536870912: The minimum diskSize is 1Gi bytes",
                r#"pool.failureDomains[1]: Invalid value: "fd-z": The failure domain is not defined in the platform failure domains"#,
                r#"pool.failureDomains[2]: Duplicate value: "fd-a""#,
            ]
        );
    }
}
