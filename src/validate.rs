//! Primitive value validators shared by the install-config validation. Each returns a plain error
//! whose message becomes the detail of a field error.

use crate::ipnet::IpNet;
use anyhow::{bail, ensure, Context, Result};
use base64::{engine::general_purpose::STANDARD as base64_standard, Engine as _};
use itertools::Itertools;
use lazy_regex::regex;
use std::{net::IpAddr, str::FromStr};

const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;
const DNS1123_LABEL_MAX_LENGTH: usize = 63;

const DNS1123_SUBDOMAIN_ERROR: &str = "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, '-' or '.', and must start and end with an alphanumeric character (e.g. 'example.com', regex used for validation is '[a-z0-9]([-a-z0-9]*[a-z0-9])?(\\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*')";

const SSH_KEY_TYPES: &[&str] = &[
    "ssh-rsa",
    "ssh-dss",
    "ssh-ed25519",
    "ecdsa-sha2-nistp256",
    "ecdsa-sha2-nistp384",
    "ecdsa-sha2-nistp521",
    "sk-ssh-ed25519@openssh.com",
    "sk-ecdsa-sha2-nistp256@openssh.com",
];

pub(crate) fn domain_name(v: &str, accept_trailing_dot: bool) -> Result<()> {
    let v = if accept_trailing_dot { v.strip_suffix('.').unwrap_or(v) } else { v };

    let mut errs = vec![];
    if v.len() > DNS1123_SUBDOMAIN_MAX_LENGTH {
        errs.push(format!("must be no more than {} characters", DNS1123_SUBDOMAIN_MAX_LENGTH));
    }
    if !regex!(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").is_match(v) {
        errs.push(DNS1123_SUBDOMAIN_ERROR.to_string());
    }

    ensure!(errs.is_empty(), "{}", errs.join(", "));
    Ok(())
}

pub(crate) fn cluster_name(v: &str) -> Result<()> {
    domain_name(v, false)?;

    let label = v.split('.').next().unwrap_or_default();
    ensure!(
        label.len() <= DNS1123_LABEL_MAX_LENGTH,
        "cluster name's first label must be no more than {} characters",
        DNS1123_LABEL_MAX_LENGTH
    );

    Ok(())
}

/// On-prem platforms use the cluster name as a DNS label in a number of places, so it cannot
/// contain dots
pub(crate) fn on_prem_cluster_name(v: &str) -> Result<()> {
    ensure!(!v.contains('.'), "cluster name must not contain '.'");
    cluster_name(v)
}

pub(crate) fn no_proxy_domain_name(v: &str) -> Result<()> {
    domain_name(v.strip_prefix('.').unwrap_or(v), true)
}

pub(crate) fn ssh_public_key(v: &str) -> Result<()> {
    let mut found = false;

    for line in v.lines().map(str::trim).filter(|line| !line.is_empty() && !line.starts_with('#')) {
        let mut fields = line.split_whitespace();
        let key_type = fields.next().context("ssh: no key found")?;
        ensure!(SSH_KEY_TYPES.contains(&key_type), "ssh: no key found");

        let blob = base64_standard
            .decode(fields.next().context("ssh: no key found")?)
            .ok()
            .context("ssh: no key found")?;
        ensure!(embedded_key_type(&blob)? == key_type, "ssh: no key found");

        found = true;
    }

    ensure!(found, "ssh: no key found");
    Ok(())
}

/// The wire format of an SSH public key starts with its type as a length-prefixed string
fn embedded_key_type(blob: &[u8]) -> Result<&str> {
    ensure!(blob.len() >= 4, "ssh: short read");
    let len = u32::from_be_bytes([blob[0], blob[1], blob[2], blob[3]]) as usize;
    let key_type = blob.get(4..4 + len).context("ssh: short read")?;
    std::str::from_utf8(key_type).context("ssh: invalid key type")
}

pub(crate) fn image_pull_secret(secret: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(secret).context("invalid pull secret JSON")?;

    let auths = match value.get("auths").and_then(|auths| auths.as_object()) {
        Some(auths) if !auths.is_empty() => auths,
        _ => bail!("auths required"),
    };

    let errs = auths
        .iter()
        .filter(|(_, auth)| auth.get("auth").is_none() && auth.get("credsStore").is_none())
        .map(|(registry, _)| format!("{:?} requires either auth or credsStore", registry))
        .collect::<Vec<_>>();

    match errs.as_slice() {
        [] => Ok(()),
        [single] => bail!("{}", single),
        many => bail!("[{}]", many.join(", ")),
    }
}

pub(crate) fn ca_bundle(v: &str) -> Result<()> {
    let pems = pem::parse_many(v.as_bytes()).context("invalid block")?;
    ensure!(!pems.is_empty(), "invalid block");

    for pem in pems {
        ensure!(pem.tag() == "CERTIFICATE", "unexpected PEM block type {}", pem.tag());
        x509_certificate::X509Certificate::from_der(pem.contents()).context("parsing certificate")?;
    }

    Ok(())
}

pub(crate) fn subnet_cidr(cidr: &IpNet) -> Result<()> {
    ensure!(!cidr.addr.is_unspecified(), "address must be specified");
    if let IpAddr::V4(addr) = cidr.addr {
        ensure!(addr.octets()[0] != 0, "address must not be in 0.0.0.0/8");
    }

    let truncated = cidr.trunc();
    ensure!(
        truncated.addr == cidr.addr,
        "invalid network address. got {}, expecting {}",
        cidr,
        truncated
    );

    Ok(())
}

pub(crate) fn service_subnet_cidr(cidr: &IpNet) -> Result<()> {
    subnet_cidr(cidr)?;

    ensure!(
        cidr.is_ipv4() || cidr.prefix >= 112,
        "subnet size for IPv6 service network must be /112 or greater"
    );

    Ok(())
}

pub(crate) fn ip(v: &str) -> Result<IpAddr> {
    let ip = IpAddr::from_str(v).ok().context(format!("{:?} is not a valid IP", v))?;
    ensure!(!ip.is_unspecified(), "IP address {:?} is unspecified", v);
    Ok(ip)
}

/// An IP address or a domain name
pub(crate) fn host(v: &str) -> Result<()> {
    if IpAddr::from_str(v).is_ok() {
        return Ok(());
    }
    domain_name(v, false).context(format!("{:?} is neither a valid IP nor a valid domain name", v))
}

pub(crate) fn port(port: i32) -> Result<()> {
    ensure!((1..=65535).contains(&port), "must be in the range of 1 to 65535");
    Ok(())
}

pub(crate) fn uri(v: &str, schemes: &[&str]) -> Result<url::Url> {
    let parsed = url::Url::parse(v).context(format!("parse {:?}", v))?;
    ensure!(
        schemes.contains(&parsed.scheme()),
        "unsupported scheme {:?}, supported schemes: {}",
        parsed.scheme(),
        schemes.iter().join(", ")
    );
    Ok(parsed)
}
