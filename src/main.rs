//! Buddy - 学习助手命令行
//!
//! 用法：
//! - `buddy [--config path]`：交互模式，每行一个请求；`:milestone <id|序号|文本>` 设置当前里程碑
//!   （优先从最近生成的路线图中查找），`:clear` 清空历史，`:quit` 退出
//! - `buddy ask <请求>`：单次请求
//! - `buddy resume <session_id> <answers.json>`：提交测验答卷并继续暂停的会话
//! - `buddy purge`：清理过期检查点

use std::path::PathBuf;

use anyhow::{bail, Context};
use buddy::config::{load_config, AppConfig};
use buddy::core::{resolve_milestone, Orchestrator, Turn, WorkflowResult, WorkflowStatus};
use buddy::memory::ConversationMemory;
use buddy::workers::schema::Roadmap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    buddy::observability::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = take_flag(&mut args, "--config").map(PathBuf::from);

    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let orchestrator = &Orchestrator::from_config(&cfg);

    match args.first().map(String::as_str) {
        None => repl(orchestrator, &cfg).await,
        Some("ask") => {
            let request = args[1..].join(" ");
            if request.trim().is_empty() {
                bail!("usage: buddy ask <request>");
            }
            let result = with_ctrl_c(|token| async move {
                orchestrator.handle(Turn::new(request), &token).await
            })
            .await
            .context("Request failed")?;
            print_result(&result);
            Ok(())
        }
        Some("resume") => {
            let (Some(session_id), Some(path)) = (args.get(1), args.get(2)) else {
                bail!("usage: buddy resume <session_id> <answers.json>");
            };
            let payload = read_payload(path)?;
            let result = with_ctrl_c(|token| async move {
                orchestrator.resume(session_id, payload, &token).await
            })
            .await
            .with_context(|| format!("Resume of session {session_id} failed"))?;
            print_result(&result);
            Ok(())
        }
        Some("purge") => {
            let purged = orchestrator
                .purge_expired()
                .await
                .context("Checkpoint purge failed")?;
            println!("purged {purged} expired session(s)");
            Ok(())
        }
        Some(other) => bail!("unknown command '{other}' (expected ask, resume or purge)"),
    }
}

/// 交互模式：对话历史保留在进程内，每轮喂给压缩器
async fn repl(orchestrator: &Orchestrator, cfg: &AppConfig) -> anyhow::Result<()> {
    let mut memory = ConversationMemory::new(cfg.app.max_context_turns);
    let mut milestone: Option<String> = None;
    let mut roadmap: Option<Roadmap> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("buddy ready. Type a request, :milestone <id|number|text>, :clear or :quit.");
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line {
            ":quit" | ":q" => break,
            ":clear" => {
                memory.clear();
                milestone = None;
                roadmap = None;
                println!("history cleared");
                continue;
            }
            _ => {}
        }
        if let Some(selector) = line.strip_prefix(":milestone") {
            milestone = resolve_milestone(roadmap.as_ref(), selector);
            println!("milestone: {}", milestone.as_deref().unwrap_or("(none)"));
            continue;
        }

        let mut turn = Turn::new(line).with_history(memory.history_lines());
        if let Some(m) = &milestone {
            turn = turn.with_milestone(m.clone());
        }
        match with_ctrl_c(|token| async move { orchestrator.handle(turn, &token).await }).await {
            Ok(result) => {
                print_result(&result);
                memory.push_turn(line, result.reply.clone());
                if let Some(generated) = result.state.roadmap {
                    println!("(select a milestone with :milestone <id>)");
                    roadmap = Some(generated);
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

/// 运行期间 Ctrl+C 取消当前请求（在下一步派发前生效）
async fn with_ctrl_c<F, Fut, T>(run: F) -> T
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: std::future::Future<Output = T>,
{
    let token = CancellationToken::new();
    let watcher = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        })
    };
    let out = run(token).await;
    watcher.abort();
    out
}

fn print_result(result: &WorkflowResult) {
    println!("{}", result.reply);
    for video in &result.state.videos {
        println!("  - {} ({}) {}", video.title, video.channel, video.url);
    }
    if let WorkflowStatus::Paused { session_id, at } = &result.status {
        println!();
        println!("Session {session_id} is waiting at {at}.");
        println!("Submit answers with: buddy resume {session_id} <answers.json>");
        println!(r#"  answers.json: {{"quiz": <quiz>, "user_answers": {{"mcq_0": "..."}}}}"#);
        if let Some(quiz) = &result.state.quiz_output {
            match serde_json::to_string_pretty(quiz) {
                Ok(json) => println!("quiz:\n{json}"),
                Err(e) => tracing::warn!(error = %e, "failed to render quiz"),
            }
        }
    }
}

fn read_payload(path: &str) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("{path} is not valid JSON"))
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.remove(pos);
    (pos < args.len()).then(|| args.remove(pos))
}
