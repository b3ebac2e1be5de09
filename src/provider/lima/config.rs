//! Lima instance definition for a sandbox VM.

use anyhow::Result;
use serde_yaml::Value;

use crate::provider::CreateOptions;

/// Debian 12 genericcloud image for the host architecture.
fn default_image() -> (&'static str, &'static str) {
    let arch = std::env::consts::ARCH;
    if arch == "aarch64" || arch == "arm64" {
        (
            "https://cloud.debian.org/images/cloud/bookworm/latest/debian-12-genericcloud-arm64.qcow2",
            "aarch64",
        )
    } else {
        (
            "https://cloud.debian.org/images/cloud/bookworm/latest/debian-12-genericcloud-amd64.qcow2",
            "x86_64",
        )
    }
}

/// Render the Lima YAML for a sandbox instance.
///
/// Sandboxes get no host mounts; work is brought in by the setup steps.
pub fn generate_lima_config(opts: &CreateOptions) -> Result<String> {
    let mut config = serde_yaml::Mapping::new();

    let (default_location, image_arch) = default_image();
    let location = opts.image.as_deref().unwrap_or(default_location);
    let mut image_config = serde_yaml::Mapping::new();
    image_config.insert("location".into(), location.into());
    image_config.insert("arch".into(), image_arch.into());
    config.insert("images".into(), vec![Value::Mapping(image_config)].into());

    #[cfg(target_os = "macos")]
    {
        config.insert("vmType".into(), "vz".into());
    }

    #[cfg(not(target_os = "macos"))]
    {
        config.insert("vmType".into(), "qemu".into());
    }

    config.insert("cpus".into(), Value::Number(opts.cpus.into()));
    config.insert("memory".into(), opts.memory.as_str().into());
    config.insert("disk".into(), opts.disk.as_str().into());

    // No containerd in sandboxes.
    let mut containerd = serde_yaml::Mapping::new();
    containerd.insert("system".into(), false.into());
    containerd.insert("user".into(), false.into());
    config.insert("containerd".into(), containerd.into());

    config.insert("mounts".into(), Value::Sequence(Vec::new()));

    let mut ssh = serde_yaml::Mapping::new();
    ssh.insert("forwardAgent".into(), false.into());
    config.insert("ssh".into(), ssh.into());

    Ok(serde_yaml::to_string(&config)?)
}
