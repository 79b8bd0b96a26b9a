//! `mysql` client session over a child process.
//!
//! FLUSH TABLES WITH READ LOCK only lasts as long as the session that took
//! it, so the client is spawned once and kept alive until UNLOCK TABLES.
//!
//! Протокол:
//! - каждое выражение пишется в stdin и сопровождается `SELECT '<marker>';`
//! - stdout читается до строки с маркером: всё, что было до неё, это вывод
//!   выражения (batch mode: tab-separated, первая строка — заголовок);
//! - в batch mode клиент завершается на первой ошибке, поэтому EOF до маркера
//!   означает, что выражение не выполнилось (текст ошибки — в stderr).

use anyhow::{anyhow, Context, Result};
use log::debug;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::model::ReplicaStatus;

/// Connection parameters for the `mysql` client.
#[derive(Clone)]
pub struct MysqlSettings {
    pub bin: PathBuf,
    pub host: String,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

impl std::fmt::Debug for MysqlSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MysqlSettings")
            .field("bin", &self.bin)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish()
    }
}

pub struct MysqlSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    seq: u64,
}

impl MysqlSession {
    pub fn connect(settings: &MysqlSettings) -> Result<Self> {
        let mut cmd = Command::new(&settings.bin);
        cmd.arg("--batch")
            .arg("--unbuffered")
            .arg("-h")
            .arg(&settings.host)
            .arg("-u")
            .arg(&settings.user)
            .arg(&settings.database)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // пароль только через окружение дочернего процесса, не через argv
        if let Some(pwd) = settings.password.as_deref() {
            cmd.env("MYSQL_PWD", pwd);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawn {}", settings.bin.display()))?;
        let stdin = child.stdin.take().ok_or_else(|| anyhow!("mysql: no stdin pipe"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("mysql: no stdout pipe"))?;

        let mut session = Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            seq: 0,
        };
        // ping: fails fast on bad credentials or unreachable host
        session
            .execute("SELECT 1")
            .with_context(|| format!("connect to mysql at {} as {}", settings.host, settings.user))?;
        Ok(session)
    }

    /// False once the client has exited (after a failed statement or `close`).
    pub fn is_open(&self) -> bool {
        self.stdin.is_some()
    }

    /// Run one statement and return its raw output lines.
    pub fn execute(&mut self, sql: &str) -> Result<Vec<String>> {
        self.seq += 1;
        let marker = format!("__snapwarden_done_{}__", self.seq);
        debug!("mysql: {}", sql);

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("mysql session is closed"))?;
        let script = format!("{sql};\nSELECT '{marker}';\n");
        if let Err(e) = stdin.write_all(script.as_bytes()).and_then(|_| stdin.flush()) {
            return Err(self.failure(sql, anyhow!("write to mysql stdin: {e}")));
        }

        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let n = match self.stdout.read_line(&mut line) {
                Ok(n) => n,
                Err(e) => return Err(self.failure(sql, anyhow!("read mysql stdout: {e}"))),
            };
            if n == 0 {
                return Err(self.failure(sql, anyhow!("mysql exited")));
            }
            let line = line.trim_end_matches(['\r', '\n']).to_string();
            if line == marker {
                // header of the marker SELECT; its single value row follows
                let mut value = String::new();
                let _ = self.stdout.read_line(&mut value);
                break;
            }
            lines.push(line);
        }
        Ok(lines)
    }

    fn failure(&mut self, sql: &str, err: anyhow::Error) -> anyhow::Error {
        self.stdin = None;
        let _ = self.child.wait();
        let mut stderr = String::new();
        if let Some(mut s) = self.child.stderr.take() {
            let _ = s.read_to_string(&mut stderr);
        }
        let stderr = stderr.trim();
        if stderr.is_empty() {
            err.context(format!("mysql statement '{sql}' failed"))
        } else {
            err.context(format!("mysql statement '{sql}' failed: {stderr}"))
        }
    }

    /// Run a statement whose result is a single row, as column -> value.
    pub fn query_row(&mut self, sql: &str) -> Result<ReplicaStatus> {
        let lines = self.execute(sql)?;
        Ok(parse_status_rows(&lines))
    }

    /// Close stdin and wait for the client to exit.
    pub fn close(mut self) -> Result<()> {
        self.stdin = None;
        let status = self.child.wait().context("wait for mysql client")?;
        if !status.success() {
            return Err(anyhow!("mysql client exited with {status}"));
        }
        Ok(())
    }
}

impl Drop for MysqlSession {
    fn drop(&mut self) {
        // закрытие stdin завершает клиент, а с ним и сессию (и её блокировку)
        self.stdin = None;
        let _ = self.child.wait();
    }
}

/// Parse batch-mode output (header row + first value row) into a map.
/// Empty output (e.g. not a replica) yields an empty map.
pub fn parse_status_rows(lines: &[String]) -> ReplicaStatus {
    let mut it = lines.iter();
    let (Some(header), Some(values)) = (it.next(), it.next()) else {
        return ReplicaStatus::new();
    };
    header
        .split('\t')
        .zip(values.split('\t'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
