//! Structured command construction.
//!
//! Remote steps are built as argument lists rather than concatenated
//! strings, then rendered to a single shell line with proper quoting just
//! before execution. A raw script form exists for the few steps that need
//! real shell syntax (globs, pipelines, an existence conditional).

use std::fmt;

/// A single command to run on a host.
///
/// # Example
///
/// ```
/// use deckhand::command::CommandLine;
///
/// let cmd = CommandLine::new("bundle")
///     .args(["exec", "rake", "sitemap:refresh"])
///     .current_dir("/var/www/app/current")
///     .env("RAILS_ENV", "production");
/// assert_eq!(
///     cmd.to_shell(),
///     "cd /var/www/app/current && export RAILS_ENV=production && bundle exec rake sitemap:refresh"
/// );
/// ```
#[derive(Debug, Clone)]
pub struct CommandLine {
    kind: CommandKind,
    cwd: Option<String>,
    env: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
enum CommandKind {
    /// Program plus argument list, quoted on render.
    Argv { program: String, args: Vec<String> },
    /// A verbatim shell fragment. Callers own its quoting.
    Script(String),
}

impl CommandLine {
    /// Create an argv command for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Argv {
                program: program.into(),
                args: Vec::new(),
            },
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Create a raw shell script step.
    ///
    /// Reserved for steps that genuinely need shell features: glob
    /// expansion, pipelines, or conditionals.
    pub fn script(script: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Script(script.into()),
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        if let CommandKind::Argv { args, .. } = &mut self.kind {
            args.push(arg.into());
        }
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, new_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let CommandKind::Argv { args, .. } = &mut self.kind {
            args.extend(new_args.into_iter().map(Into::into));
        }
        self
    }

    /// Set the working directory the command runs in.
    pub fn current_dir(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set an environment variable for the command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Render the command to a single shell line.
    ///
    /// Layout: `cd <dir> && export K=v && <body>`. Environment variables
    /// are exported rather than prefixed so that script bodies starting
    /// with a compound command (`if`, pipelines) stay valid.
    pub fn to_shell(&self) -> String {
        let mut segments = Vec::new();

        if let Some(cwd) = &self.cwd {
            segments.push(format!("cd {}", shell_words::quote(cwd)));
        }

        for (key, value) in &self.env {
            segments.push(format!("export {}={}", key, shell_words::quote(value)));
        }

        let body = match &self.kind {
            CommandKind::Argv { program, args } => {
                let mut argv: Vec<&str> = Vec::with_capacity(args.len() + 1);
                argv.push(program);
                argv.extend(args.iter().map(String::as_str));
                shell_words::join(argv)
            }
            CommandKind::Script(script) => script.clone(),
        };
        segments.push(body);

        segments.join(" && ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell())
    }
}
