//! Line-oriented operator shell. Each line is one UI event.

use anyhow::{anyhow, bail, Result};
use shared::domain::ParameterValue;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tuner_core::{CalibrationSession, CalibrationView, EngineError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Set {
        key: String,
        value: ParameterValue,
    },
    /// Simulates a slider drag: every step is a separate edit event.
    Sweep {
        key: String,
        from: ParameterValue,
        to: ParameterValue,
        step: ParameterValue,
    },
    Name(String),
    Show,
    Flush,
    Commit(String),
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  set <key> <value>               edit one bound
  sweep <key> <from> <to> <step>  drag a bound through a range
  name <text>                     set the pending configuration name
  show                            print readouts and snippet
  flush                           wait for pending updates
  commit <name>                   save current bounds under <name>
  quit";

impl ShellCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            bail!("empty command");
        };
        let rest = words.collect::<Vec<_>>();

        let number = |raw: &str| {
            raw.parse::<ParameterValue>()
                .map_err(|_| anyhow!("'{raw}' is not an integer"))
        };

        match (verb, rest.as_slice()) {
            ("set", [key, value]) => Ok(Self::Set {
                key: key.to_string(),
                value: number(*value)?,
            }),
            ("sweep", [key, from, to, step]) => {
                let step = number(*step)?;
                if step <= 0 {
                    bail!("sweep step must be positive");
                }
                Ok(Self::Sweep {
                    key: key.to_string(),
                    from: number(*from)?,
                    to: number(*to)?,
                    step,
                })
            }
            // The name is kept verbatim so the commit workflow sees what was typed.
            ("name", _) => Ok(Self::Name(tail_after(line, "name"))),
            ("commit", _) => Ok(Self::Commit(tail_after(line, "commit"))),
            ("show", []) => Ok(Self::Show),
            ("flush", []) => Ok(Self::Flush),
            ("help", []) => Ok(Self::Help),
            ("quit" | "exit", []) => Ok(Self::Quit),
            (verb, _) => bail!("unrecognised command '{verb}' (try 'help')"),
        }
    }
}

fn tail_after(line: &str, verb: &str) -> String {
    let line = line.trim_start();
    let tail = line.strip_prefix(verb).unwrap_or_default();
    tail.strip_prefix(' ').unwrap_or(tail).to_string()
}

/// Values visited by a sweep, always ending exactly on `to`.
pub fn sweep_values(
    from: ParameterValue,
    to: ParameterValue,
    step: ParameterValue,
) -> Vec<ParameterValue> {
    let mut values = Vec::new();
    let mut current = from;
    if from <= to {
        while current < to {
            values.push(current);
            current = current.saturating_add(step);
        }
    } else {
        while current > to {
            values.push(current);
            current = current.saturating_sub(step);
        }
    }
    values.push(to);
    values
}

pub fn render_view(view: &CalibrationView) -> String {
    let readouts = view
        .readouts
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{readouts}\n{}", view.snippet)
}

pub enum Flow {
    Continue,
    Stop,
}

pub async fn execute<W>(session: &CalibrationSession, command: ShellCommand, out: &mut W) -> Result<Flow>
where
    W: AsyncWrite + Unpin,
{
    let message = match command {
        ShellCommand::Set { key, value } => {
            let outcome = session.edit(&key, value)?;
            match outcome.adjusted {
                Some((partner, adjusted)) => {
                    format!("{}={} ({partner} moved to {adjusted})", outcome.key, outcome.value)
                }
                None => format!("{}={}", outcome.key, outcome.value),
            }
        }
        ShellCommand::Sweep {
            key,
            from,
            to,
            step,
        } => {
            // Only values a control can hold are visited.
            let limit = session
                .pairs()
                .iter()
                .find_map(|pair| pair.bound_of(&key).map(|_| pair.limit))
                .ok_or_else(|| EngineError::UnknownParameter(key.clone()))?;
            let values = sweep_values(from.clamp(0, limit), to.clamp(0, limit), step);
            for value in &values {
                session.edit(&key, *value)?;
            }
            format!("swept {key} through {} values", values.len())
        }
        ShellCommand::Name(name) => {
            session.set_pending_name(&name);
            session.view().snippet
        }
        ShellCommand::Show => render_view(&session.view()),
        ShellCommand::Flush => {
            session.flush().await;
            "all updates delivered".to_string()
        }
        ShellCommand::Commit(name) => {
            let receipt = session.commit(&name).await?;
            format!("Configuration saved successfully as '{}'.", receipt.configuration.name)
        }
        ShellCommand::Help => HELP.to_string(),
        ShellCommand::Quit => return Ok(Flow::Stop),
    };
    out.write_all(message.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(Flow::Continue)
}

/// Reads commands until EOF or `quit`. Command errors are reported and the
/// shell keeps going.
pub async fn run<R, W>(session: &CalibrationSession, input: R, out: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let flow = match ShellCommand::parse(&line) {
            Ok(command) => execute(session, command, out).await,
            Err(error) => Err(error),
        };
        match flow {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => break,
            Err(error) => {
                out.write_all(format!("error: {error}\n").as_bytes()).await?;
                out.flush().await?;
            }
        }
    }
    session.flush().await;
    Ok(())
}

#[cfg(test)]
#[path = "tests/shell_tests.rs"]
mod tests;
