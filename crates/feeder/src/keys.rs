use crossterm::event::{read, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use log::error;
use wbb_plotter::JogSource;
use wbb_protocol::Jog;

/// Calibration jogs from the arrow keys. Enter confirms, Escape or q cancels.
///
/// The terminal stays in raw mode for as long as this exists.
pub struct KeyboardJogs {
    _priv: (),
}

impl KeyboardJogs {
    pub fn new() -> anyhow::Result<Self> {
        eprintln!("Calibration: arrow keys to move, <enter> to confirm a corner, <esc> to give up.");
        eprintln!("Move to the upper-left spool.");
        enable_raw_mode()?;
        Ok(KeyboardJogs { _priv: () })
    }
}

fn key_to_jog(code: KeyCode, modifiers: KeyModifiers) -> Option<Jog> {
    match code {
        KeyCode::Up => Some(Jog::Up),
        KeyCode::Down => Some(Jog::Down),
        KeyCode::Left => Some(Jog::Left),
        KeyCode::Right => Some(Jog::Right),
        KeyCode::Enter => Some(Jog::Confirm),
        KeyCode::Esc | KeyCode::Char('q') => Some(Jog::Cancel),
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Some(Jog::Cancel),
        KeyCode::Char(c) => Jog::from_char(c).ok(),
        _ => None,
    }
}

impl JogSource for KeyboardJogs {
    fn next_jog(&mut self) -> anyhow::Result<Jog> {
        loop {
            let Event::Key(ev) = read()? else {
                continue;
            };
            if ev.kind != KeyEventKind::Press {
                continue;
            }
            if let Some(jog) = key_to_jog(ev.code, ev.modifiers) {
                if jog == Jog::Confirm {
                    eprint!("Corner confirmed.\r\n");
                }
                return Ok(jog);
            }
        }
    }
}

impl Drop for KeyboardJogs {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            error!("couldn't restore the terminal: {e}");
        }
    }
}
