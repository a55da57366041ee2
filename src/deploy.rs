// (C) Coralbits SL 2025
// This file is part of PDF Generator and is licensed under the
// GNU Affero General Public License v3.0.
// A commercial license on request is also available;
// contact info@coralbits.com for details.

//! Host provisioning files: systemd unit, nginx site, firewall rules and
//! the service config, rendered from the templates in `templates/`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use minijinja::Environment;
use serde::Serialize;
use tracing::info;

use crate::config::Config;

const SERVICE_TEMPLATE: &str = include_str!("../templates/pdf-generator.service.j2");
const NGINX_TEMPLATE: &str = include_str!("../templates/pdf-generator.nginx.conf.j2");
const FIREWALL_TEMPLATE: &str = include_str!("../templates/firewall.sh.j2");

#[derive(Debug, Clone, Serialize, clap::Args)]
pub struct DeployOptions {
    /// Name of the systemd unit and nginx site
    #[arg(long, default_value = "pdf-generator")]
    pub service_name: String,
    /// Unprivileged user the service runs as
    #[arg(long, default_value = "pdfgen")]
    pub user: String,
    #[arg(long, default_value = "/opt/pdf-generator")]
    pub install_dir: String,
    /// Public server name for nginx
    #[arg(long, default_value = "_")]
    pub domain: String,
    /// Per-client request rate, nginx syntax
    #[arg(long, default_value = "10r/m")]
    pub rate_limit: String,
    #[arg(long, default_value_t = 5)]
    pub burst: u32,
    #[arg(long, default_value_t = 300)]
    pub proxy_timeout_secs: u32,
    #[arg(long, default_value = "20m")]
    pub max_body_size: String,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            service_name: "pdf-generator".to_string(),
            user: "pdfgen".to_string(),
            install_dir: "/opt/pdf-generator".to_string(),
            domain: "_".to_string(),
            rate_limit: "10r/m".to_string(),
            burst: 5,
            proxy_timeout_secs: 300,
            max_body_size: "20m".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TemplateContext<'a> {
    #[serde(flatten)]
    options: &'a DeployOptions,
    description: &'a str,
    binary_path: String,
    config_path: String,
    port: u16,
    zone: String,
}

#[derive(Debug)]
pub struct RenderedDeployment {
    pub files: Vec<(String, String)>,
}

impl RenderedDeployment {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|(file, _)| file == name)
            .map(|(_, content)| content.as_str())
    }
}

pub fn render_deployment(options: &DeployOptions, config: &Config) -> Result<RenderedDeployment> {
    // the service is only reached through the proxy
    let mut service_config = config.clone();
    service_config.server.host = "127.0.0.1".to_string();

    let install_dir = Path::new(&options.install_dir);
    let ctx = TemplateContext {
        options,
        description: "PDF Generator service",
        binary_path: install_dir.join("bin").join("pdf-generator").display().to_string(),
        config_path: install_dir.join("config.yaml").display().to_string(),
        port: service_config.server.port,
        zone: format!("{}_limit", options.service_name.replace('-', "_")),
    };

    let mut env = Environment::new();
    env.add_template("service", SERVICE_TEMPLATE)?;
    env.add_template("nginx", NGINX_TEMPLATE)?;
    env.add_template("firewall", FIREWALL_TEMPLATE)?;

    let files = vec![
        (
            format!("{}.service", options.service_name),
            env.get_template("service")?.render(&ctx)?,
        ),
        (
            format!("{}.nginx.conf", options.service_name),
            env.get_template("nginx")?.render(&ctx)?,
        ),
        (
            "firewall.sh".to_string(),
            env.get_template("firewall")?.render(&ctx)?,
        ),
        (
            "config.yaml".to_string(),
            serde_yaml::to_string(&service_config)?,
        ),
    ];
    Ok(RenderedDeployment { files })
}

/// Renders everything into `output`, returning the written paths
pub fn write_deployment(
    options: &DeployOptions,
    config: &Config,
    output: &Path,
) -> Result<Vec<PathBuf>> {
    let rendered = render_deployment(options, config)?;
    std::fs::create_dir_all(output)
        .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", output.display(), e))?;

    let mut written = Vec::new();
    for (name, content) in rendered.files {
        let path = output.join(&name);
        std::fs::write(&path, content)
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", path.display(), e))?;
        if name.ends_with(".sh") {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        }
        info!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}
