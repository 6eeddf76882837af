//! `marquee simulate`: mount cards and replay hover episodes.

use anyhow::Result;
use marquee::config::Config;
use marquee::preview::{PreviewContext, PreviewSessionManager};
use marquee::streaming::VideoSurface;
use marquee_common::MediaRef;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct Plan {
    pub media_ids: Vec<String>,
    pub dwell: Duration,
    pub gap: Duration,
    pub overlap: bool,
}

struct Card {
    title: String,
    surface: VideoSurface,
    manager: PreviewSessionManager,
    printer: JoinHandle<()>,
}

fn select_media(config: &Config, ids: &[String]) -> Result<Vec<MediaRef>> {
    if ids.is_empty() {
        if config.media.is_empty() {
            anyhow::bail!("No media to simulate; add [[media]] entries or pass media ids");
        }
        return Ok(config.media.iter().map(|m| m.media_ref()).collect());
    }

    Ok(ids
        .iter()
        .map(|id| {
            config
                .media
                .iter()
                .find(|m| &m.id == id)
                .map(|m| m.media_ref())
                .unwrap_or_else(|| MediaRef::new(id, id, ""))
        })
        .collect())
}

fn mount(ctx: &PreviewContext, media: MediaRef) -> Card {
    let title = media.title.clone();
    let surface = VideoSurface::new();
    let manager = PreviewSessionManager::spawn(ctx.clone(), media, surface.clone());

    let mut updates = manager.subscribe();
    let label = title.clone();
    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            let signal = snapshot.signal();
            println!(
                "[{}] {:<22} hover={:<7} poster={} video={} loading={}{}",
                label,
                snapshot.state.to_string(),
                format!("{:?}", snapshot.hover).to_lowercase(),
                signal.show_poster,
                signal.show_video,
                signal.is_loading,
                signal
                    .error_message
                    .map(|m| format!(" error=\"{}\"", m))
                    .unwrap_or_default(),
            );
        }
    });

    Card {
        title,
        surface,
        manager,
        printer,
    }
}

pub async fn run(config: &Config, plan: Plan) -> Result<()> {
    let ctx = PreviewContext::from_config(config)?;
    let media = select_media(config, &plan.media_ids)?;

    tracing::info!(
        cards = media.len(),
        overlap = plan.overlap,
        max_concurrent = ctx.budget.max(),
        "Starting hover simulation"
    );

    let cards: Vec<Card> = media.into_iter().map(|m| mount(&ctx, m)).collect();

    if plan.overlap {
        for card in &cards {
            card.manager.notify_pointer_enter();
        }
        tokio::time::sleep(plan.dwell).await;
        for card in &cards {
            card.manager.notify_pointer_leave();
        }
        tokio::time::sleep(plan.gap).await;
    } else {
        for card in &cards {
            card.manager.notify_pointer_enter();
            tokio::time::sleep(plan.dwell).await;
            card.manager.notify_pointer_leave();
            tokio::time::sleep(plan.gap).await;
        }
    }

    let mut unbalanced = Vec::new();
    for card in cards {
        card.manager.unmount().await;
        if let Err(e) = card.printer.await {
            tracing::warn!("Signal printer for {} failed: {}", card.title, e);
        }
        if card.surface.attach_count() != card.surface.detach_count() || card.surface.is_attached()
        {
            unbalanced.push(card.title);
        }
    }

    println!();
    println!(
        "Active sessions: {}/{}",
        ctx.budget.active(),
        ctx.budget.max()
    );

    if ctx.budget.active() != 0 {
        anyhow::bail!("Leaked {} budget slot(s)", ctx.budget.active());
    }
    if !unbalanced.is_empty() {
        anyhow::bail!("Surfaces left attached: {}", unbalanced.join(", "));
    }

    Ok(())
}
