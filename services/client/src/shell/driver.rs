//! services/client/src/shell/driver.rs
//!
//! The main control loop of the terminal client. It is single-threaded: typed
//! commands, session-change notifications and delivered OTP codes are handled
//! one at a time, in the order they arrive.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use vaccimap_core::{Lifecycle, LifecycleError, OnboardingError, VerifierToken};

use crate::adapters::DeliveredCode;
use crate::error::ClientError;
use crate::shell::protocol::{Command, HELP};
use crate::shell::render::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Quit,
}

pub struct Shell<W> {
    lifecycle: Lifecycle,
    verifier: VerifierToken,
    out: W,
}

impl<W: AsyncWrite + Unpin> Shell<W> {
    pub fn new(lifecycle: Lifecycle, verifier: VerifierToken, out: W) -> Self {
        Self {
            lifecycle,
            verifier,
            out,
        }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    async fn print(&mut self, text: &str) -> Result<(), ClientError> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await?;
        Ok(())
    }

    async fn show_screen(&mut self) -> Result<(), ClientError> {
        let text = render(self.lifecycle.screen());
        self.print(&format!("\n{}", text)).await
    }

    /// Bootstraps the lifecycle and shows the first screen. A failed bootstrap
    /// is shown to the user, who can `retry`.
    pub async fn start(&mut self) -> Result<(), ClientError> {
        if let Err(e) = self.lifecycle.start().await {
            self.print(&format!("Error: {}", e)).await?;
        }
        self.show_screen().await
    }

    /// Handles one line of input. Only output failures are returned as errors;
    /// everything else is printed and the shell carries on.
    pub async fn handle_line(&mut self, line: &str) -> Result<Control, ClientError> {
        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(Control::Continue),
            Err(e) => {
                self.print(&e.to_string()).await?;
                return Ok(Control::Continue);
            }
        };

        match command {
            Command::Quit => return Ok(Control::Quit),
            Command::Help => {
                self.print(HELP).await?;
                return Ok(Control::Continue);
            }
            command => match self.dispatch(command).await {
                Ok(Some(notice)) => self.print(&notice).await?,
                Ok(None) => {}
                Err(e) => self.print(&format!("Error: {}", e)).await?,
            },
        }
        self.show_screen().await?;
        Ok(Control::Continue)
    }

    async fn dispatch(&mut self, command: Command) -> Result<Option<String>, LifecycleError> {
        let lifecycle = &mut self.lifecycle;
        let notice = match command {
            Command::Phone(raw) => {
                lifecycle.send_verification(&raw, &self.verifier).await?;
                Some("OTP has been sent to your phone.".to_string())
            }
            Command::Code(code) => {
                lifecycle.confirm_code(&code).await?;
                None
            }
            Command::ChangeNumber => {
                lifecycle.change_number()?;
                None
            }
            Command::Parent(name) => {
                lifecycle.onboarding_mut()?.set_parent_name(&name);
                None
            }
            Command::Child(name) => {
                lifecycle.onboarding_mut()?.set_child_name(&name);
                None
            }
            Command::Dob(raw) => {
                lifecycle
                    .onboarding_mut()?
                    .enter_child_dob(&raw)
                    .map_err(OnboardingError::from)?;
                None
            }
            Command::Locate => {
                lifecycle.onboarding_mut()?.capture_location().await?;
                Some("Home location captured.".to_string())
            }
            Command::Save => {
                lifecycle.save_profile().await?;
                Some("Profile Saved! Your profile has been created successfully.".to_string())
            }
            Command::Refresh => {
                lifecycle.dashboard_mut()?.refresh_location().await?;
                None
            }
            Command::UpdateHome => {
                lifecycle.dashboard_mut()?.update_home_location().await?;
                Some("Home location updated.".to_string())
            }
            Command::Logout => {
                lifecycle.logout().await?;
                None
            }
            Command::Retry => {
                lifecycle.retry().await?;
                None
            }
            Command::Help | Command::Quit => None,
        };
        Ok(notice)
    }

    /// Runs until `quit` or end of input, then shuts the lifecycle down.
    pub async fn run<R>(
        mut self,
        input: R,
        mut deliveries: mpsc::UnboundedReceiver<DeliveredCode>,
    ) -> Result<(), ClientError>
    where
        R: AsyncBufRead + Unpin,
    {
        self.start().await?;
        let mut lines = input.lines();
        let mut listening = true;

        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if self.handle_line(&line).await? == Control::Quit {
                            break;
                        }
                    }
                    None => break,
                },
                change = self.lifecycle.next_session_change(), if listening => match change {
                    Some(change) => {
                        if let Err(e) = self.lifecycle.apply_session_change(change).await {
                            self.print(&format!("Error: {}", e)).await?;
                        }
                        self.show_screen().await?;
                    }
                    None => {
                        warn!("Session listener is no longer running.");
                        listening = false;
                    }
                },
                Some(delivered) = deliveries.recv() => {
                    self.print(&format!(
                        "[SMS to {}] Your VacciMap verification code is {}",
                        delivered.phone, delivered.code
                    ))
                    .await?;
                }
            }
        }

        info!("Shutting down.");
        self.lifecycle.shutdown();
        Ok(())
    }
}
