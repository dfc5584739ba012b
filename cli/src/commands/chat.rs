use std::io::{self, BufRead, Write};

use anyhow::Result;

use larder_core::chat::SendOutcome;

use crate::shell::{App, wrap};

use super::finish;
use super::helpers::report_toasts;

const WIDTH: usize = 76;

/// Send one message, or read messages from stdin until EOF.
pub(crate) async fn cmd_chat(app: &App, message: Option<&str>, json: bool) -> Result<()> {
    if let Some(text) = message {
        if let SendOutcome::Replied(reply) = app.chat.send(text).await {
            if json {
                println!("{}", serde_json::to_string_pretty(&reply)?);
            } else {
                println!("{}", wrap(&reply.text, WIDTH).join("\n"));
            }
        } else if !json && text.trim().is_empty() {
            eprintln!("Nothing to send");
        }
        finish(app, json);
        return Ok(());
    }

    for msg in app.chat.messages() {
        println!("{}", wrap(&msg.text, WIDTH).join("\n"));
    }
    let stdin = io::stdin();
    loop {
        print!("you> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if let SendOutcome::Replied(reply) = app.chat.send(&line).await {
            println!("{}", wrap(&reply.text, WIDTH).join("\n"));
        }
        report_toasts(&app.toaster, false);
    }
    Ok(())
}
