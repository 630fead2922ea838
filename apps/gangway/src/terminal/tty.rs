use crate::pty::WindowSize;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, size};

pub struct RawModeGuard(bool);

impl RawModeGuard {
    pub fn new(enable: bool) -> Self {
        if enable {
            match enable_raw_mode() {
                Ok(()) => Self(true),
                Err(err) => {
                    eprintln!("failed to enable raw mode: {err}");
                    Self(false)
                }
            }
        } else {
            Self(false)
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.0 {
            let _ = disable_raw_mode();
        }
    }
}

pub fn detect_terminal_size() -> WindowSize {
    match size() {
        Ok((cols, rows)) => WindowSize::new(cols, rows),
        Err(_) => WindowSize::default(),
    }
}
