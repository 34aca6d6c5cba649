use std::process::{Command, Output};
use std::time::{Duration, Instant};

fn rasterize(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cdp-rasterize"))
        .args(args)
        .output()
        .expect("run cdp-rasterize")
}

#[test]
fn missing_url_prints_usage_and_exits_2() {
    let output = rasterize(&[]);
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"), "{stdout}");
}

#[test]
fn too_many_positionals_exit_2() {
    let output = rasterize(&["https://example.com", "a.png", "b.png"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn bad_value_is_explained_on_stderr() {
    let output = rasterize(&["https://example.com", "--viewport", "wide"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--viewport"), "{stderr}");
    assert!(stderr.contains("wide"), "{stderr}");
}

#[cfg(unix)]
#[test]
fn unresponsive_browser_is_cut_off_at_timeout() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let chrome = dir.path().join("chrome");
    // Never prints a DevTools endpoint, and a child keeps stderr open even
    // after the script itself is killed.
    std::fs::write(&chrome, "#!/bin/sh\nsleep 30 &\nwait\n").expect("write fake browser");
    std::fs::set_permissions(&chrome, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake browser");
    let out = dir.path().join("out.png");

    let start = Instant::now();
    let output = loop {
        let output = rasterize(&[
            "https://example.com",
            out.to_str().unwrap(),
            "--timeout",
            "1s",
            "--chrome",
            chrome.to_str().unwrap(),
        ]);
        // Another test forking while the script was still open for writing
        // makes exec fail with ETXTBSY; that is a launch failure, retry it.
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.contains("Text file busy") {
            break output;
        }
    };

    assert_eq!(output.status.code(), Some(124));
    assert!(start.elapsed() < Duration::from_secs(10), "{:?}", start.elapsed());
    assert!(!out.exists());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Timeout, giving up."), "{stdout}");
}
