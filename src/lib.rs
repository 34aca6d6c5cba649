/*!
Rasterize a web page to an image file with headless Chrome, driven over the
Chrome DevTools Protocol (CDP).

Loading a page is easy; knowing when it is done is not. A "load finished"
signal can arrive before client-side redirects and late content settle, a
redirect can restart the page while a capture is scheduled, and a broken page
may never finish at all. The [`CaptureController`] owns that policy:

- wait a settle delay after each finished load, dropping the schedule whenever
  a new navigation starts;
- retry failed captures under a [`RetryPolicy`];
- end every run within a hard deadline.

```no_run
use cdp_rasterize::{Browser, CaptureConfig, CaptureController, CaptureJob, CdpEngine};

# async fn demo() -> anyhow::Result<()> {
let config = CaptureConfig::default();
let browser = Browser::launch(&config.browser, config.viewport).await?;
let mut engine = CdpEngine::new(browser.new_tab().await?).await?;

let job = CaptureJob::new("https://www.rust-lang.org/", "rust.png", config.viewport);
let outcome = CaptureController::new(&mut engine, job, &config).run().await;
println!("{outcome}");
# Ok(())
# }
```
*/

pub mod browser;
pub mod capture;
pub mod cli;
pub mod compat;
pub mod config;
pub mod engine;
mod tab;
mod transport;
pub mod types;
mod utils;

pub use browser::{Browser, BrowserOptions};
pub use capture::{CaptureController, CaptureJob, CaptureOutcome, Clock, FailureReason};
pub use compat::CompatShim;
pub use config::{CaptureConfig, NavigationPolicy, RetryPolicy};
pub use engine::{CdpEngine, Engine, EngineEvent, LoadStatus};
pub use tab::Tab;
pub use types::{ClipRegion, ImageFormat, Viewport};
