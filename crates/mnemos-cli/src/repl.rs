//! REPL – Read-Eval-Print Loop for the Mnemos interactive shell.
//!
//! Supported slash-commands:
//!   /store <type> <text>  – store knowledge (type: factual, procedural, …)
//!   /recall <k> <query>   – top-k knowledge retrieval
//!   /node <id>            – show a node and its relations
//!   /clusters             – list concept clusters
//!   /session <user>       – start a memory session and make it current
//!   /remember <text>      – add to the current session's working memory
//!   /recent <k> <query>   – search the current session's memory
//!   /consolidate          – promote qualifying memories into the graph
//!   /focus <f>            – set the current session's attention focus
//!   /help                 – show this list
//!   /quit | /exit         – exit the CLI

use colored::Colorize;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mnemos_memory::{Eviction, MemoryContext};
use mnemos_types::{KnowledgeType, SessionId};
use tokio::runtime::Runtime;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Command parsing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Store { kind: KnowledgeType, text: String },
    Recall { k: usize, query: String },
    Node(Uuid),
    Clusters,
    Session(String),
    Remember(String),
    Recent { k: usize, query: String },
    Consolidate,
    Focus(f64),
    Help,
    Quit,
}

/// Parse one input line. The error is a user-facing usage message.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((h, r)) => (h, r.trim()),
        None => (line, ""),
    };
    match head {
        "/store" => {
            let (kind, text) = split_arg(rest).ok_or("usage: /store <type> <text>")?;
            let kind = kind.parse::<KnowledgeType>().map_err(|e| e.to_string())?;
            Ok(Command::Store {
                kind,
                text: text.to_string(),
            })
        }
        "/recall" => {
            let (k, query) = parse_k_query(rest).ok_or("usage: /recall <k> <query>")?;
            Ok(Command::Recall { k, query })
        }
        "/node" => Uuid::parse_str(rest)
            .map(Command::Node)
            .map_err(|_| "usage: /node <uuid>".to_string()),
        "/clusters" => Ok(Command::Clusters),
        "/session" if !rest.is_empty() => Ok(Command::Session(rest.to_string())),
        "/session" => Err("usage: /session <user>".to_string()),
        "/remember" if !rest.is_empty() => Ok(Command::Remember(rest.to_string())),
        "/remember" => Err("usage: /remember <text>".to_string()),
        "/recent" => {
            let (k, query) = parse_k_query(rest).ok_or("usage: /recent <k> <query>")?;
            Ok(Command::Recent { k, query })
        }
        "/consolidate" => Ok(Command::Consolidate),
        "/focus" => rest
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Command::Focus)
            .ok_or_else(|| "usage: /focus <0.0-1.0>".to_string()),
        "/help" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        other => Err(format!("Unknown command: '{other}'")),
    }
}

fn split_arg(rest: &str) -> Option<(&str, &str)> {
    let (a, b) = rest.split_once(char::is_whitespace)?;
    let b = b.trim();
    (!b.is_empty()).then_some((a, b))
}

fn parse_k_query(rest: &str) -> Option<(usize, String)> {
    let (k, query) = split_arg(rest)?;
    Some((k.parse().ok()?, query.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────────────────────────────────────

struct Shell {
    ctx: MemoryContext,
    rt: Runtime,
    session: Option<(SessionId, String)>,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(ctx: MemoryContext, rt: Runtime, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut shell = Shell {
        ctx,
        rt,
        session: None,
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let prompt = match &shell.session {
            Some((_, user)) => format!("mnemos[{user}]>"),
            None => "mnemos>".to_string(),
        };
        print!("{} ", prompt.bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Ok(Command::Quit) => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(cmd) => shell.dispatch(cmd),
            Err(msg) => println!(
                "{} Type {} for available commands.",
                msg.red(),
                "/help".bold()
            ),
        }
    }

    shell.ctx.shutdown();
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

impl Shell {
    fn dispatch(&mut self, cmd: Command) {
        match cmd {
            Command::Store { kind, text } => self.cmd_store(kind, &text),
            Command::Recall { k, query } => self.cmd_recall(k, &query),
            Command::Node(id) => self.cmd_node(id),
            Command::Clusters => self.cmd_clusters(),
            Command::Session(user) => self.cmd_session(&user),
            Command::Remember(text) => self.cmd_remember(&text),
            Command::Recent { k, query } => self.cmd_recent(k, &query),
            Command::Consolidate => self.cmd_consolidate(),
            Command::Focus(f) => self.cmd_focus(f),
            Command::Help => cmd_help(),
            Command::Quit => {}
        }
    }

    fn current_session(&self) -> Option<SessionId> {
        let id = self.session.as_ref().map(|(id, _)| *id);
        if id.is_none() {
            println!(
                "{} Start one with {}.",
                "No active session.".yellow(),
                "/session <user>".bold()
            );
        }
        id
    }

    fn cmd_store(&self, kind: KnowledgeType, text: &str) {
        let result = self
            .rt
            .block_on(self.ctx.store_knowledge(text, kind, HashMap::new()));
        match result {
            Ok(node) => {
                println!("  {} {}", "stored".green().bold(), node.id.to_string().dimmed());
                println!("  tags       : {}", node.tags.join(", ").yellow());
                println!("  importance : {:.3}", node.importance);
                println!("  links      : {}", node.relations.len());
                if let Some(cluster) = self.ctx.graph().cluster_of(node.id) {
                    println!(
                        "  cluster    : {} ({} member(s))",
                        cluster.name.bold(),
                        cluster.members.len()
                    );
                }
            }
            Err(e) => println!("{}: {}", "Store failed".red(), e),
        }
    }

    fn cmd_recall(&self, k: usize, query: &str) {
        match self
            .rt
            .block_on(self.ctx.retrieve_knowledge(query, k, HashMap::new()))
        {
            Ok(hits) if hits.is_empty() => println!("  {}", "No knowledge stored yet.".dimmed()),
            Ok(hits) => {
                for (i, hit) in hits.iter().enumerate() {
                    println!(
                        "  {}. [{:.3}] {} {}",
                        i + 1,
                        hit.score,
                        hit.node.knowledge_type.to_string().cyan(),
                        hit.node.content
                    );
                    println!("       {}", hit.node.id.to_string().dimmed());
                }
            }
            Err(e) => println!("{}: {}", "Recall failed".red(), e),
        }
    }

    fn cmd_node(&self, id: Uuid) {
        match self.ctx.graph().get_node(id) {
            Ok(node) => {
                println!("{}", node.content.bold());
                println!("  type       : {}", node.knowledge_type);
                println!("  status     : {:?}", node.validation_status);
                println!("  tags       : {}", node.tags.join(", "));
                println!("  importance : {:.3}", node.importance);
                println!("  accessed   : {} time(s)", node.access_count);
                for rel in &node.relations {
                    println!(
                        "  → {:?} {} ({:.3})",
                        rel.relation_type,
                        rel.target_id.to_string().dimmed(),
                        rel.strength
                    );
                }
            }
            Err(e) => println!("{}", e.to_string().red()),
        }
    }

    fn cmd_clusters(&self) {
        let mut clusters = self.ctx.graph().clusters();
        if clusters.is_empty() {
            println!("  {}", "No clusters yet.".dimmed());
            return;
        }
        clusters.sort_by(|a, b| b.members.len().cmp(&a.members.len()));
        for c in clusters {
            println!(
                "  {:<24} {:>4} member(s)  {}",
                c.name.bold(),
                c.members.len(),
                c.category.to_string().dimmed()
            );
        }
    }

    fn cmd_session(&mut self, user: &str) {
        match self.rt.block_on(self.ctx.start_session(user)) {
            Ok(session) => {
                println!(
                    "  {} session {} for {} (capacity {}, focus {:.2})",
                    "✓".green().bold(),
                    session.id.to_string().dimmed(),
                    user.bold(),
                    session.capacity,
                    session.attention_focus
                );
                self.session = Some((session.id, user.to_string()));
            }
            Err(e) => println!("{}: {}", "Session failed".red(), e),
        }
    }

    fn cmd_remember(&self, text: &str) {
        let Some(sid) = self.current_session() else {
            return;
        };
        match self
            .rt
            .block_on(self.ctx.add_to_working_memory(sid, text, HashMap::new()))
        {
            Ok(outcome) => {
                println!(
                    "  {} activation {:.3}",
                    "remembered".green(),
                    outcome.item.activation
                );
                for eviction in &outcome.evicted {
                    let (label, item) = match eviction {
                        Eviction::Demoted(item) => ("demoted".yellow(), item),
                        Eviction::Discarded(item) => ("discarded".red(), item),
                    };
                    println!("  {} {}", label, item.content.dimmed());
                }
            }
            Err(e) => println!("{}: {}", "Remember failed".red(), e),
        }
    }

    fn cmd_recent(&self, k: usize, query: &str) {
        let Some(sid) = self.current_session() else {
            return;
        };
        match self.rt.block_on(self.ctx.retrieve_from_memory(sid, query, k)) {
            Ok(hits) if hits.is_empty() => println!("  {}", "Session memory is empty.".dimmed()),
            Ok(hits) => {
                for hit in hits {
                    println!(
                        "  [{:.3}] {} {}",
                        hit.score,
                        hit.item.content,
                        format!(
                            "(activation {:.2}, retrieved {}×)",
                            hit.item.activation, hit.item.retrieval_count
                        )
                        .dimmed()
                    );
                }
            }
            Err(e) => println!("{}: {}", "Recent failed".red(), e),
        }
    }

    fn cmd_consolidate(&self) {
        let Some(sid) = self.current_session() else {
            return;
        };
        match self.rt.block_on(self.ctx.consolidate_memory(sid)) {
            Ok(0) => println!("  {}", "Nothing qualifies for consolidation yet.".dimmed()),
            Ok(n) => println!("  {} {} memory item(s) into the graph", "promoted".green(), n),
            Err(e) => println!("{}: {}", "Consolidation failed".red(), e),
        }
    }

    fn cmd_focus(&self, focus: f64) {
        let Some(sid) = self.current_session() else {
            return;
        };
        match self
            .rt
            .block_on(self.ctx.sessions().set_attention_focus(sid, focus))
        {
            Ok(f) => println!("  attention focus set to {:.2}", f),
            Err(e) => println!("{}: {}", "Focus failed".red(), e),
        }
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Mnemos Commands".bold().underline());
    println!("  {}  – store knowledge", "/store <type> <text>".bold().cyan());
    println!(
        "      types: {}",
        KnowledgeType::ALL
            .iter()
            .map(|t| t.as_str().to_lowercase())
            .collect::<Vec<_>>()
            .join(", ")
            .dimmed()
    );
    println!("  {}   – retrieve the k best matches", "/recall <k> <query>".bold().cyan());
    println!("  {}            – show a node and its relations", "/node <id>".bold().cyan());
    println!("  {}             – list concept clusters", "/clusters".bold().cyan());
    println!("  {}       – start a memory session", "/session <user>".bold().cyan());
    println!("  {}      – add to working memory", "/remember <text>".bold().cyan());
    println!("  {}   – search session memory", "/recent <k> <query>".bold().cyan());
    println!("  {}          – promote memories into the graph", "/consolidate".bold().cyan());
    println!("  {}            – set attention focus (0–1)", "/focus <f>".bold().cyan());
    println!("  {}         – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}
