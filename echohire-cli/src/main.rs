//! echohire-cli: terminal client for the EchoHire HTTP API
//!
//! # Subcommands
//! - `practice [--finalize [--company C] [--date D]]`: run a practice dialogue
//! - `status <interview-id>`         : live call status of an interview
//! - `feedback <interview-id> [--generate] [--force]`: show or request feedback
//! - `transcript <interview-id>`     : print the interview transcript
//! - `health`                        : show server health
//!
//! Every command except `health` needs a caller identity (`--user` or `ECHOHIRE_USER_ID`).

use std::io::{BufRead, Write};

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "echohire-cli", version, about = "EchoHire mock interview client")]
struct Cli {
    /// EchoHire HTTP server URL (overrides ECHOHIRE_HTTP_URL env var)
    #[arg(long, env = "ECHOHIRE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Caller identity sent as X-User-Id
    #[arg(long, env = "ECHOHIRE_USER_ID")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Practice interactively with the interview coach
    Practice {
        /// Turn the finished dialogue into a scheduled interview
        #[arg(long)]
        finalize: bool,

        /// Company to record on the finalized interview
        #[arg(long, requires = "finalize")]
        company: Option<String>,

        /// Interview date (YYYY-MM-DD or RFC 3339) for the finalized interview
        #[arg(long, requires = "finalize")]
        date: Option<String>,
    },

    /// Show the call status of an interview
    Status { interview_id: String },

    /// Show feedback for an interview
    Feedback {
        interview_id: String,

        /// Ask the server to synthesize AI feedback if none exists
        #[arg(long)]
        generate: bool,

        /// Generate even if the interview is not completed
        #[arg(long, requires = "generate")]
        force: bool,
    },

    /// Print the transcript of an interview
    Transcript { interview_id: String },

    /// Show server health
    Health,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReply {
    pub session_id: String,
    pub phase: String,
    pub reply: String,
    #[serde(default)]
    pub question_index: usize,
    #[serde(default)]
    pub total_questions: usize,
}

impl TurnReply {
    pub fn is_complete(&self) -> bool {
        self.phase == "COMPLETE"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackView {
    pub source: String,
    pub overall_score: u8,
    pub overall_impression: String,
    pub recommendation: String,
    pub recommendation_text: String,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub next_steps: String,
}

// ============================================================================
// Formatting
// ============================================================================

/// Render a dialogue turn, prefixed with the question counter while asking.
pub fn format_turn(turn: &TurnReply) -> String {
    if turn.phase == "ASKING" && turn.question_index > 0 {
        format!(
            "[Question {}/{}]\n{}",
            turn.question_index, turn.total_questions, turn.reply
        )
    } else {
        turn.reply.clone()
    }
}

pub fn format_feedback(f: &FeedbackView) -> String {
    let mut out = format!(
        "Score:          {}/100\nRecommendation: {} ({})\nSource:         {}\n\n{}\n",
        f.overall_score, f.recommendation_text, f.recommendation, f.source, f.overall_impression
    );
    if !f.key_insights.is_empty() {
        out.push_str("\nKey insights:\n");
        for insight in &f.key_insights {
            out.push_str(&format!("  - {}\n", insight));
        }
    }
    if !f.next_steps.is_empty() {
        out.push_str(&format!("\nNext steps: {}\n", f.next_steps));
    }
    out
}

/// Best human-readable message from an error body.
pub fn api_error(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string());
    format!("server returned {}: {}", status, detail)
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

struct Api {
    client: reqwest::blocking::Client,
    server: String,
    user: Option<String>,
}

impl Api {
    fn new(server: &str, user: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(90))
            .build()?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
            user,
        })
    }

    fn user(&self) -> anyhow::Result<&str> {
        self.user
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--user or ECHOHIRE_USER_ID is required"))
    }

    fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> anyhow::Result<(reqwest::StatusCode, Value)> {
        let url = format!("{}{}", self.server, path);
        let mut req = self.client.request(method, &url);
        if let Some(user) = &self.user {
            req = req.header("X-User-Id", user);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req
            .send()
            .map_err(|e| anyhow::anyhow!("connection failed to {}: {}", url, e))?;
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!(api_error(status, &text));
        }
        Ok((status, serde_json::from_str(&text).unwrap_or(Value::Null)))
    }
}

fn do_practice(
    api: &Api,
    finalize: bool,
    company: Option<String>,
    date: Option<String>,
) -> anyhow::Result<()> {
    api.user()?;
    let (_, body) = api.send(reqwest::Method::POST, "/workflow/start", None)?;
    let mut turn: TurnReply = serde_json::from_value(body)?;
    println!("{}\n", format_turn(&turn));

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    while !turn.is_complete() {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next() else {
            eprintln!("\nPractice ended early. Session: {}", turn.session_id);
            return Ok(());
        };
        let line = line?;
        let (_, body) = api.send(
            reqwest::Method::POST,
            "/workflow/message",
            Some(serde_json::json!({ "sessionId": turn.session_id, "message": line })),
        )?;
        turn = serde_json::from_value(body)?;
        println!("\n{}\n", format_turn(&turn));
    }

    if finalize {
        let (_, body) = api.send(
            reqwest::Method::POST,
            "/workflow/finalize",
            Some(serde_json::json!({
                "sessionId": turn.session_id,
                "companyName": company,
                "interviewDate": date,
            })),
        )?;
        println!(
            "Interview created: {}",
            body["interview"]["id"].as_str().unwrap_or("?")
        );
    }
    Ok(())
}

fn do_status(api: &Api, id: &str) -> anyhow::Result<()> {
    api.user()?;
    let (_, body) = api.send(reqwest::Method::GET, &format!("/interviews/{}/ai-status", id), None)?;
    let interview = &body["interview"];
    println!("Interview: {}", interview["id"].as_str().unwrap_or(id));
    println!("Role:      {}", interview["jobTitle"].as_str().unwrap_or("?"));
    println!("Status:    {}", interview["status"].as_str().unwrap_or("?"));
    println!(
        "Provider:  {}{}",
        body["providerStatus"].as_str().unwrap_or("-"),
        if body["live"].as_bool().unwrap_or(false) { "" } else { " (cached)" }
    );
    if let Some(d) = interview["call"]["durationSeconds"].as_f64() {
        println!("Duration:  {:.0}s", d);
    }
    Ok(())
}

fn do_feedback(api: &Api, id: &str, generate: bool, force: bool) -> anyhow::Result<()> {
    api.user()?;
    let (status, body) = if generate {
        api.send(
            reqwest::Method::POST,
            &format!("/interviews/{}/ai-feedback?force={}", id, force),
            None,
        )?
    } else {
        api.send(reqwest::Method::GET, &format!("/interviews/{}/feedback", id), None)?
    };

    if status == reqwest::StatusCode::ACCEPTED {
        println!("Transcript not available yet; try again shortly.");
        return Ok(());
    }
    let feedback: FeedbackView = serde_json::from_value(body["feedback"].clone())?;
    print!("{}", format_feedback(&feedback));
    Ok(())
}

fn do_transcript(api: &Api, id: &str) -> anyhow::Result<()> {
    api.user()?;
    let (_, body) = api.send(reqwest::Method::GET, &format!("/interviews/{}/transcript", id), None)?;
    println!("{}", body["document"]["text"].as_str().unwrap_or(""));
    Ok(())
}

fn do_health(api: &Api) -> anyhow::Result<()> {
    let (_, body) = api.send(reqwest::Method::GET, "/health", None)?;
    println!("EchoHire server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:         {}", body["version"].as_str().unwrap_or("?"));
    println!("Store:           {}", body["store"].as_str().unwrap_or("?"));
    if let Some(pg) = body["postgresql"].as_str() {
        println!("PostgreSQL:      {}", pg);
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let result = Api::new(&cli.server, cli.user).and_then(|api| match cli.command {
        Commands::Practice {
            finalize,
            company,
            date,
        } => do_practice(&api, finalize, company, date),
        Commands::Status { interview_id } => do_status(&api, &interview_id),
        Commands::Feedback {
            interview_id,
            generate,
            force,
        } => do_feedback(&api, &interview_id, generate, force),
        Commands::Transcript { interview_id } => do_transcript(&api, &interview_id),
        Commands::Health => do_health(&api),
    });

    if let Err(e) = result {
        eprintln!("echohire-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
