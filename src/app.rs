use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, RecvTimeoutError};

use crate::api;
use crate::auth;
use crate::config;
use crate::data::{
    HttpCategoryService, HttpCommentService, HttpFeedService, HttpInteractionService,
};
use crate::player;
use crate::session;
use crate::storage;
use crate::watch;

const TICK_INTERVAL: Duration = Duration::from_millis(250);

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;

    let store =
        Arc::new(storage::Store::open(storage::Options::default()).context("open storage")?);

    let flow = Arc::new(
        auth::Flow::new(auth::Config {
            base_url: cfg.api.base_url.clone(),
            user_agent: cfg.api.user_agent.clone(),
            country_code: cfg.api.country_code.clone(),
        })
        .context("build auth flow")?,
    );

    let manager = Arc::new(session::Manager::new(store.clone(), flow));
    manager.load_existing().context("resume stored session")?;

    let client = Arc::new(
        api::Client::new(
            manager.clone(),
            api::ClientConfig {
                user_agent: cfg.api.user_agent.clone(),
                base_url: Some(cfg.api.base_url.clone()),
                http_client: None,
            },
        )
        .context("build api client")?,
    );

    let element = player::MpvElement::new(&cfg.playback.player_command);

    let mut session = watch::Session::new(watch::Options {
        feed_service: Arc::new(HttpFeedService::new(client.clone())),
        category_service: Arc::new(HttpCategoryService::new(client.clone())),
        comment_service: Arc::new(HttpCommentService::new(client.clone())),
        interaction_service: Arc::new(HttpInteractionService::new(client)),
        session_manager: manager.clone(),
        element: Box::new(element),
        initial_entry: None,
        page_size: cfg.feed.page_size,
        preload_threshold: cfg.feed.preload_threshold,
        comment_page_size: cfg.feed.comment_page_size,
        autoplay: cfg.playback.autoplay,
        start_muted: cfg.playback.start_muted,
        auto_advance_delay: cfg.playback.auto_advance_delay,
        rating_countdown: cfg.rating.countdown,
        rating_ack: cfg.rating.ack_duration,
    });

    println!("Reelview {} — type 'help' for commands.", crate::VERSION);
    if manager.is_signed_in() {
        if let Some(active) = manager.active() {
            println!("Signed in as {}.", active.account.username);
        }
    } else {
        println!("Browsing signed out; sign in to like, comment, and follow.");
    }

    session.start();

    let (line_tx, line_rx) = unbounded::<String>();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut last_status = String::new();
    loop {
        session.pump();
        session.tick(Instant::now());

        if session.status() != last_status {
            last_status = session.status().to_string();
            println!("* {}", last_status);
            io::stdout().flush().ok();
        }

        match line_rx.recv_timeout(TICK_INTERVAL) {
            Ok(line) => {
                if !dispatch(&mut session, &manager, line.trim()) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}

/// Map one console command onto the session. Returns false to quit.
fn dispatch(
    session: &mut watch::Session,
    manager: &Arc<session::Manager>,
    line: &str,
) -> bool {
    let mut parts = line.splitn(2, ' ');
    let command = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    match command {
        "" => {}
        "q" | "quit" => return false,
        "help" => print_help(),
        "n" | "next" => session.advance(1),
        "p" | "prev" => session.advance(-1),
        "play" => session.toggle_play(),
        "m" | "mute" => session.toggle_mute(),
        "l" | "like" => session.toggle_like(),
        "b" | "bookmark" => session.toggle_bookmark(),
        "f" | "follow" => session.toggle_follow(),
        "1" | "2" | "3" | "4" | "5" => {
            let rating = command.parse::<u8>().unwrap_or(0);
            session.submit_rating(rating, Instant::now());
        }
        "c" | "comment" => {
            if rest.is_empty() {
                println!("usage: comment <text>");
            } else {
                session.add_comment(rest);
            }
        }
        "d" | "delete" => {
            if rest.is_empty() {
                println!("usage: delete <comment-id>");
            } else {
                session.delete_comment(rest);
            }
        }
        "cl" => {
            if rest.is_empty() {
                println!("usage: cl <comment-id>");
            } else {
                session.toggle_comment_like(rest);
            }
        }
        "cat" => {
            if rest.is_empty() {
                println!("usage: cat <category-id>");
            } else {
                session.toggle_category(rest);
            }
        }
        "all" => session.toggle_all_categories(),
        "cats" => {
            for category in session.categories() {
                let marker = if session.selection().contains(&category.id) {
                    "*"
                } else if session.selection().is_all() {
                    "·"
                } else {
                    " "
                };
                println!("{} {}  {}", marker, category.id, category.name);
            }
        }
        "i" | "info" => print_current(session),
        "comments" => print_comments(session),
        "signin" => {
            let mut args = rest.splitn(2, ' ');
            let identity = args.next().unwrap_or_default();
            let password = args.next().unwrap_or_default();
            if identity.is_empty() || password.is_empty() {
                println!("usage: signin <email|phone|username> <password>");
            } else {
                match manager.sign_in(identity, password) {
                    Ok(active) => println!("Signed in as {}.", active.account.username),
                    Err(err) => println!("Sign-in failed: {err:#}"),
                }
            }
        }
        "signout" => match manager.sign_out() {
            Ok(()) => println!("Signed out."),
            Err(err) => println!("Sign-out failed: {err:#}"),
        },
        other => println!("Unknown command '{}'; type 'help'.", other),
    }
    true
}

fn print_current(session: &watch::Session) {
    match session.current_entry() {
        Some(entry) => {
            let position = session
                .current_index()
                .map(|idx| format!("{}/{}", idx + 1, session.loaded_count()))
                .unwrap_or_default();
            println!(
                "[{}] \"{}\" by {}{}",
                position,
                entry.title,
                entry.uploader.display_name(),
                if entry.is_followed { " (following)" } else { "" },
            );
            if !entry.description.is_empty() {
                println!("    {}", entry.description);
            }
            if !entry.hashtags.is_empty() {
                println!("    {}", entry.hashtags.join(" "));
            }
            println!(
                "    {} views · {} likes{} · {} comments · {}{}",
                entry.views,
                entry.likes,
                if entry.is_liked { " (liked)" } else { "" },
                entry.comments,
                if entry.is_bookmarked {
                    "bookmarked"
                } else {
                    "not bookmarked"
                },
                if session.is_muted() { " · muted" } else { "" },
            );
        }
        None => println!("No video loaded yet."),
    }
}

fn print_comments(session: &watch::Session) {
    if session.comments().is_empty() {
        println!("No comments yet.");
        return;
    }
    let now = chrono::Utc::now();
    for comment in session.comments() {
        println!(
            "{}  {} {} · {} · {} likes{}",
            comment.id,
            comment.first_name,
            comment.last_name,
            comment.age(now),
            comment.likes,
            if comment.is_liked { " (liked)" } else { "" },
        );
        println!("    {}", comment.body);
    }
}

fn print_help() {
    println!(
        "Commands:\n  n/next, p/prev       Move through the feed\n  play, m/mute         Toggle playback / mute\n  l, b, f              Like, bookmark, follow\n  1-5                  Rate the video when the prompt is up\n  c <text>             Comment on the current video\n  d <comment-id>       Delete your comment\n  cl <comment-id>      Like a comment\n  cats, cat <id>, all  Show / toggle category filters\n  i/info, comments     Show current video / its comments\n  signin, signout      Manage your account\n  q                    Quit"
    );
}
