use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use msp430_core::{exec, CoreError, Machine, Uart};
use std::cell::RefCell;
use std::io::{stdout, Write};
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Parser, Debug)]
#[command(name = "msp430-tui")]
#[command(about = "Single-step an MSP430 ELF image in a terminal monitor")]
struct Args {
    /// ELF image to execute
    image: PathBuf,

    /// Number of instructions to run per 'r' keypress
    #[arg(long, default_value_t = 100)]
    run_steps: u64,

    /// Do not use the alternate screen buffer (useful in capture panes)
    #[arg(long, default_value_t = false)]
    no_alt_screen: bool,
}

/// Collects guest output for display; there is no input source, so reads
/// hand the guest the conventional 0xFF.
struct MonitorUart {
    output: Rc<RefCell<Vec<u8>>>,
}

impl Uart for MonitorUart {
    fn print(&mut self, byte: u8) {
        self.output.borrow_mut().push(byte);
    }

    fn read(&mut self) -> u8 {
        0xFF
    }
}

struct TerminalGuard {
    use_alt: bool,
}

impl TerminalGuard {
    fn enter(use_alt: bool) -> Result<Self> {
        let mut out = stdout();
        crossterm::terminal::enable_raw_mode()?;
        if use_alt {
            crossterm::execute!(out, EnterAlternateScreen)?;
        }
        crossterm::execute!(out, Hide, Clear(ClearType::All))?;
        out.flush()?;
        Ok(Self { use_alt })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut out = stdout();
        let _ = crossterm::execute!(out, Show);
        if self.use_alt {
            let _ = crossterm::execute!(out, LeaveAlternateScreen);
        }
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

fn render_frame(machine: &Machine, uart_output: &[u8], status: &str) -> Result<()> {
    let mut out = stdout();
    crossterm::queue!(out, MoveTo(0, 0), Clear(ClearType::All))?;

    for (row, line) in machine.regs.dump_string().lines().enumerate() {
        crossterm::queue!(out, MoveTo(2, row as u16))?;
        write!(out, "{line}")?;
    }

    crossterm::queue!(out, MoveTo(2, 6))?;
    write!(out, "uart:")?;
    let text = String::from_utf8_lossy(uart_output);
    for (row, line) in text.lines().enumerate() {
        crossterm::queue!(out, MoveTo(2, 7 + row as u16))?;
        write!(out, "{line}")?;
    }

    let status_row = 8 + text.lines().count() as u16;
    crossterm::queue!(out, MoveTo(0, status_row), Clear(ClearType::CurrentLine))?;
    write!(out, "{status}")?;
    out.flush()?;
    Ok(())
}

fn step_once(machine: &mut Machine, halted: &mut bool) -> String {
    match exec::step(machine) {
        Ok(()) => String::new(),
        Err(CoreError::Halt) => {
            *halted = true;
            format!("{}", CoreError::Halt)
        }
        Err(err) => {
            *halted = true;
            format!("fault: {err}")
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let output = Rc::new(RefCell::new(Vec::new()));
    let uart = MonitorUart {
        output: Rc::clone(&output),
    };
    let mut machine = Machine::new(Box::new(uart));
    machine
        .load_file(&args.image)
        .with_context(|| format!("failed to load {}", args.image.display()))?;

    let _guard = TerminalGuard::enter(!args.no_alt_screen)?;
    let mut status = String::from("s/space: step  r: run  q: quit");
    let mut halted = false;

    loop {
        render_frame(&machine, &output.borrow(), &status)?;

        let event = event::read()?;
        let Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) = event
        else {
            continue;
        };

        match code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => break,
            KeyCode::Char('s') | KeyCode::Char(' ') if !halted => {
                status = step_once(&mut machine, &mut halted);
            }
            KeyCode::Char('r') if !halted => {
                status.clear();
                for _ in 0..args.run_steps {
                    status = step_once(&mut machine, &mut halted);
                    if halted {
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}
