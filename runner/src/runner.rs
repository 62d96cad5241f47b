//! The main window and run loop.
//!
//! Drives one emulated frame per iteration, paced to the 20 ms frame
//! deadline unless warp mode is on, and presents the framebuffer
//! through a pixels surface. Hotkeys: F5 saves a snapshot, F7 restores
//! it (a warning if none was saved), F8 toggles warp mode, Escape
//! quits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use emu_core::{KeyCode, Machine};
use machine_oric::{Oric, Snapshot};
use pixels::{Pixels, SurfaceTexture};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::KeyCode as WinitKeyCode;
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowId};

use crate::audio::AudioOutput;

/// Frame period at 50 Hz.
const FRAME_PERIOD: Duration = Duration::from_millis(20);

/// Configuration for the runner.
pub struct RunnerConfig {
    /// Window title.
    pub title: String,
    /// Integer scale factor for sharp pixels.
    pub scale: u32,
}

/// Run the machine until the window closes.
pub fn run(oric: Oric, config: RunnerConfig) -> Result<(), String> {
    let event_loop = EventLoop::new().map_err(|e| e.to_string())?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = Runner::new(oric, config);
    event_loop.run_app(&mut runner).map_err(|e| e.to_string())
}

struct Runner {
    oric: Oric,
    config: RunnerConfig,
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    audio: Option<AudioOutput>,
    audio_started: bool,
    snapshot: Option<Snapshot>,
    next_frame: Instant,
}

impl Runner {
    fn new(oric: Oric, config: RunnerConfig) -> Self {
        Self {
            oric,
            config,
            window: None,
            pixels: None,
            audio: None,
            audio_started: false,
            snapshot: None,
            next_frame: Instant::now(),
        }
    }

    fn toggle_warp(&mut self) {
        let warp = !self.oric.warp();
        self.oric.set_warp(warp);

        if let Some(audio) = &self.audio {
            audio.set_paused(warp);
        }
        if !warp {
            self.next_frame = Instant::now();
        }
    }

    fn save_snapshot(&mut self) {
        self.snapshot = Some(self.oric.save_state());
        log::info!("snapshot saved");
    }

    fn load_snapshot(&mut self) {
        match &self.snapshot {
            Some(snapshot) => {
                let snapshot = snapshot.clone();
                self.oric.load_state(&snapshot);
                log::info!("snapshot loaded");
            }
            None => log::warn!("no snapshot saved"),
        }
    }
}

impl ApplicationHandler for Runner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let video_config = self.oric.video_config();
        let scaled_width = video_config.width * self.config.scale;
        let scaled_height = video_config.height * self.config.scale;

        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title(&self.config.title)
                        .with_inner_size(LogicalSize::new(scaled_width, scaled_height)),
                )
                .expect("Failed to create window"),
        );

        let size = window.inner_size();
        let surface = SurfaceTexture::new(size.width, size.height, Arc::clone(&window));
        let pixels = Pixels::new(video_config.width, video_config.height, surface)
            .expect("Failed to create pixels");

        let audio = AudioOutput::new(self.oric.audio_config().sample_rate, self.oric.audio_handle());
        if audio.is_none() {
            log::warn!("no audio device available, sound disabled");
        }

        self.window = Some(window);
        // SAFETY: pixels' lifetime is tied to the window, which lives for
        // the rest of the program
        self.pixels = Some(unsafe { std::mem::transmute(pixels) });
        self.audio = audio;
        self.next_frame = Instant::now();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if size.width > 0 && size.height > 0 {
                    if let Some(pixels) = &mut self.pixels {
                        pixels.resize_surface(size.width, size.height).ok();
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(keycode) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => {
                            if !event.repeat {
                                match keycode {
                                    WinitKeyCode::Escape => {
                                        event_loop.exit();
                                        return;
                                    }
                                    WinitKeyCode::F5 => self.save_snapshot(),
                                    WinitKeyCode::F7 => self.load_snapshot(),
                                    WinitKeyCode::F8 => self.toggle_warp(),
                                    _ => {}
                                }
                            }

                            if let Some(key) = convert_keycode(keycode) {
                                self.oric.key_down(key);
                            }
                        }
                        ElementState::Released => {
                            if let Some(key) = convert_keycode(keycode) {
                                self.oric.key_up(key);
                            }
                        }
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                if let Some(pixels) = &mut self.pixels {
                    if pixels.render().is_err() {
                        event_loop.exit();
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            return;
        }

        self.oric.run_frame();

        if !self.audio_started {
            // Unpause the device once emulation is actually producing
            if let Some(audio) = &self.audio {
                audio.set_paused(false);
            }
            self.audio_started = true;
        }

        // In warp mode most frames are skipped; only present the ones
        // the machine reports.
        if self.oric.frame_presented() {
            if let Some(pixels) = &mut self.pixels {
                self.oric.render(pixels.frame_mut());
            }
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }

        // Pace to the 20 ms deadline; if wall time has already passed,
        // skip the sleep and rebase.
        self.next_frame += FRAME_PERIOD;
        let now = Instant::now();
        if now > self.next_frame {
            self.next_frame = now;
        } else if !self.oric.warp() {
            std::thread::sleep(self.next_frame - now);
        }
    }
}

/// Convert a winit key code to the machine-facing key code.
fn convert_keycode(keycode: WinitKeyCode) -> Option<KeyCode> {
    match keycode {
        // Letters
        WinitKeyCode::KeyA => Some(KeyCode::KeyA),
        WinitKeyCode::KeyB => Some(KeyCode::KeyB),
        WinitKeyCode::KeyC => Some(KeyCode::KeyC),
        WinitKeyCode::KeyD => Some(KeyCode::KeyD),
        WinitKeyCode::KeyE => Some(KeyCode::KeyE),
        WinitKeyCode::KeyF => Some(KeyCode::KeyF),
        WinitKeyCode::KeyG => Some(KeyCode::KeyG),
        WinitKeyCode::KeyH => Some(KeyCode::KeyH),
        WinitKeyCode::KeyI => Some(KeyCode::KeyI),
        WinitKeyCode::KeyJ => Some(KeyCode::KeyJ),
        WinitKeyCode::KeyK => Some(KeyCode::KeyK),
        WinitKeyCode::KeyL => Some(KeyCode::KeyL),
        WinitKeyCode::KeyM => Some(KeyCode::KeyM),
        WinitKeyCode::KeyN => Some(KeyCode::KeyN),
        WinitKeyCode::KeyO => Some(KeyCode::KeyO),
        WinitKeyCode::KeyP => Some(KeyCode::KeyP),
        WinitKeyCode::KeyQ => Some(KeyCode::KeyQ),
        WinitKeyCode::KeyR => Some(KeyCode::KeyR),
        WinitKeyCode::KeyS => Some(KeyCode::KeyS),
        WinitKeyCode::KeyT => Some(KeyCode::KeyT),
        WinitKeyCode::KeyU => Some(KeyCode::KeyU),
        WinitKeyCode::KeyV => Some(KeyCode::KeyV),
        WinitKeyCode::KeyW => Some(KeyCode::KeyW),
        WinitKeyCode::KeyX => Some(KeyCode::KeyX),
        WinitKeyCode::KeyY => Some(KeyCode::KeyY),
        WinitKeyCode::KeyZ => Some(KeyCode::KeyZ),

        // Numbers
        WinitKeyCode::Digit0 => Some(KeyCode::Digit0),
        WinitKeyCode::Digit1 => Some(KeyCode::Digit1),
        WinitKeyCode::Digit2 => Some(KeyCode::Digit2),
        WinitKeyCode::Digit3 => Some(KeyCode::Digit3),
        WinitKeyCode::Digit4 => Some(KeyCode::Digit4),
        WinitKeyCode::Digit5 => Some(KeyCode::Digit5),
        WinitKeyCode::Digit6 => Some(KeyCode::Digit6),
        WinitKeyCode::Digit7 => Some(KeyCode::Digit7),
        WinitKeyCode::Digit8 => Some(KeyCode::Digit8),
        WinitKeyCode::Digit9 => Some(KeyCode::Digit9),

        // Modifiers
        WinitKeyCode::ShiftLeft => Some(KeyCode::ShiftLeft),
        WinitKeyCode::ShiftRight => Some(KeyCode::ShiftRight),
        WinitKeyCode::ControlLeft => Some(KeyCode::ControlLeft),
        WinitKeyCode::ControlRight => Some(KeyCode::ControlRight),
        WinitKeyCode::AltLeft => Some(KeyCode::AltLeft),
        WinitKeyCode::AltRight => Some(KeyCode::AltRight),

        // Special
        WinitKeyCode::Enter => Some(KeyCode::Enter),
        WinitKeyCode::Space => Some(KeyCode::Space),
        WinitKeyCode::Backspace => Some(KeyCode::Backspace),
        WinitKeyCode::Tab => Some(KeyCode::Tab),

        // Arrow keys
        WinitKeyCode::ArrowUp => Some(KeyCode::ArrowUp),
        WinitKeyCode::ArrowDown => Some(KeyCode::ArrowDown),
        WinitKeyCode::ArrowLeft => Some(KeyCode::ArrowLeft),
        WinitKeyCode::ArrowRight => Some(KeyCode::ArrowRight),

        // Punctuation
        WinitKeyCode::Comma => Some(KeyCode::Comma),
        WinitKeyCode::Period => Some(KeyCode::Period),
        WinitKeyCode::Slash => Some(KeyCode::Slash),
        WinitKeyCode::Semicolon => Some(KeyCode::Semicolon),
        WinitKeyCode::Quote => Some(KeyCode::Quote),
        WinitKeyCode::BracketLeft => Some(KeyCode::BracketLeft),
        WinitKeyCode::BracketRight => Some(KeyCode::BracketRight),
        WinitKeyCode::Backslash => Some(KeyCode::Backslash),
        WinitKeyCode::Minus => Some(KeyCode::Minus),
        WinitKeyCode::Equal => Some(KeyCode::Equal),
        WinitKeyCode::Backquote => Some(KeyCode::Backquote),

        _ => None,
    }
}
