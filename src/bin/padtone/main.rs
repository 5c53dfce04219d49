//! padtone - terminal touch pad
//!
//! Drag the mouse across the pad to play: horizontal position picks the
//! pitch, vertical position drives volume and the effects send.
//! Run with: cargo run

mod app;
mod ui;

use app::App;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    App::new()?.run()
}
