use anyhow::{Context, Result, anyhow};
use rand::prelude::SliceRandom;
use serde::Deserialize;
use std::net;
use std::path::{Path, PathBuf};
use which::which;

#[cfg(windows)]
use winreg::{RegKey, enums::HKEY_LOCAL_MACHINE};

use crate::browser::temp_dir::CustomTempDir;
use crate::types::Viewport;

static DEFAULT_ARGS: [&str; 19] = [
    "--no-sandbox",
    "--no-zygote",
    "--in-process-gpu",
    "--disable-dev-shm-usage",
    "--disable-background-networking",
    "--disable-component-update",
    "--disable-default-apps",
    "--disable-extensions",
    "--disable-sync",
    "--disable-translate",
    "--disable-breakpad",
    "--disable-popup-blocking",
    "--metrics-recording-only",
    "--safebrowsing-disable-auto-update",
    "--force-color-profile=srgb",
    "--hide-scrollbars",
    "--mute-audio",
    "--no-first-run",
    "--no-default-browser-check",
];

/// User-facing browser launch options, read from the `[browser]` config table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    /// Run without a visible window.
    pub headless: bool,
    /// Explicit browser executable. Auto-detected when unset.
    pub chrome: Option<PathBuf>,
    /// Accept any TLS certificate, including self-signed and expired ones.
    pub ignore_certificate_errors: bool,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome: None,
            ignore_certificate_errors: true,
        }
    }
}

pub(crate) struct BrowserConfig {
    debug_port: u16,
    headless: bool,
    ignore_certificate_errors: bool,
    window: Viewport,
    pub(crate) temp_dir: CustomTempDir,
    pub(crate) executable_path: PathBuf,
}

impl BrowserConfig {
    pub(crate) fn new(options: &BrowserOptions, window: Viewport) -> Result<Self> {
        let executable_path = match &options.chrome {
            Some(path) => path.clone(),
            None => default_executable()?,
        };
        let temp_dir = std::env::temp_dir().join("cdp-rasterize");

        Ok(Self {
            headless: options.headless,
            ignore_certificate_errors: options.ignore_certificate_errors,
            window,
            executable_path,
            debug_port: get_available_port().context("Failed to get available port")?,
            temp_dir: CustomTempDir::new(temp_dir, "profile")
                .context("Failed to create browser profile directory")?,
        })
    }

    pub(crate) fn get_browser_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", self.debug_port),
            format!("--user-data-dir={}", self.temp_dir.path().display()),
            format!("--window-size={},{}", self.window.width, self.window.height),
        ];

        args.extend(DEFAULT_ARGS.iter().map(|s| s.to_string()));
        if self.ignore_certificate_errors {
            args.push("--ignore-certificate-errors".to_string());
        }
        if self.headless {
            args.push("--headless=new".to_string());
        }
        args.push("about:blank".to_string());

        args
    }
}

fn default_executable() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CHROME")
        && Path::new(&path).exists()
    {
        return Ok(path.into());
    }

    let apps = [
        "google-chrome-stable",
        "google-chrome",
        "chromium",
        "chromium-browser",
        "microsoft-edge-stable",
        "chrome",
        "msedge",
        "microsoft-edge",
    ];
    for app in apps {
        if let Ok(path) = which(app) {
            return Ok(path);
        }
    }

    #[cfg(target_os = "macos")]
    {
        let macos_apps = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ];
        for path in macos_apps.iter() {
            let path = Path::new(path);
            if path.exists() {
                return Ok(path.into());
            }
        }
    }

    #[cfg(windows)]
    {
        if let Some(path) = get_chrome_path_from_registry().filter(|p| p.exists()) {
            return Ok(path);
        }

        let windows_apps = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for path in windows_apps.iter() {
            let path = Path::new(path);
            if path.exists() {
                return Ok(path.into());
            }
        }
    }

    Err(anyhow!("Could not auto detect a chrome executable. Set CHROME or browser.chrome."))
}

#[cfg(windows)]
fn get_chrome_path_from_registry() -> Option<PathBuf> {
    RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey("SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\App Paths\\chrome.exe")
        .and_then(|key| key.get_value::<String, _>(""))
        .map(PathBuf::from)
        .ok()
}

fn get_available_port() -> Option<u16> {
    let mut ports: Vec<u16> = (8000..9000).collect();
    ports.shuffle(&mut rand::thread_rng());
    ports.iter().find(|port| port_is_available(**port)).copied()
}

fn port_is_available(port: u16) -> bool {
    net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_reflect_options() {
        let options = BrowserOptions {
            headless: true,
            chrome: Some(PathBuf::from("/opt/chrome")),
            ignore_certificate_errors: true,
        };
        let config = BrowserConfig::new(&options, Viewport::new(640, 480)).unwrap();
        let args = config.get_browser_args();

        assert_eq!(config.executable_path, PathBuf::from("/opt/chrome"));
        assert!(args.iter().any(|a| a.starts_with("--remote-debugging-port=")));
        assert!(args.contains(&"--window-size=640,480".to_string()));
        assert!(args.contains(&"--ignore-certificate-errors".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
    }

    #[test]
    fn headed_launch_omits_headless_flag() {
        let options = BrowserOptions {
            headless: false,
            chrome: Some(PathBuf::from("/opt/chrome")),
            ignore_certificate_errors: false,
        };
        let args = BrowserConfig::new(&options, Viewport::default())
            .unwrap()
            .get_browser_args();
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert!(!args.contains(&"--ignore-certificate-errors".to_string()));
    }
}
