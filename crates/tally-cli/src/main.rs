use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use serde_json::json;
use tokio::sync::watch;
use tokio::time::{Duration as StdDuration, sleep};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use tally_core::app::{ConsumerGroup, QueueJob};
use tally_core::config::{QueueConfig, SummaryConfig};
use tally_core::domain::{
    EndOfDayTicks, Event, EventUserDescription, Organization, OrganizationId, Project, ProjectId,
    Stack, User, UserId,
};
use tally_core::impls::InMemoryBackend;
use tally_core::ports::{
    EventRepository, FixedClock, IdGenerator, MessageQueue, StackRepository, UlidGenerator,
};
use tally_core::queue::InMemoryMessageQueue;

/// `TALLY_LOG_FORMAT=json` で JSON ログ、それ以外は人間向けの text
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("TALLY_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env は任意。プロセス環境の値が優先される
    dotenvy::dotenv().ok();
    init_tracing();

    let summary_config = SummaryConfig::from_env();
    let queue_config = QueueConfig::from_env();
    info!(?summary_config, ?queue_config, "configuration loaded");

    // (A) 昨日のウィンドウがちょうど due になる時刻に時計を合わせる
    let boundary = EndOfDayTicks::end_of_day(Utc::now() - Duration::days(1));
    let clock = FixedClock::new(
        boundary.to_datetime() + Duration::hours(i64::from(summary_config.trigger_offset_hours)),
    );
    let ids = UlidGenerator::new(clock.clone());

    // (B) インメモリのストアにデモ用のデータを投入
    let backend = InMemoryBackend::new();
    let org = backend
        .organizations
        .add(Organization {
            id: OrganizationId::generate(),
            name: "Demo Org".into(),
            plan_id: "EX_FREE".into(),
        })
        .await;
    let user = backend
        .users
        .add(User {
            id: UserId::generate(),
            email_address: "ops@example.com".into(),
            is_email_address_verified: true,
            email_notifications_enabled: true,
            organization_ids: BTreeSet::from([org.id]),
        })
        .await;
    let project = backend
        .projects
        .add(
            Project::new(ProjectId::generate(), org.id, "checkout-api", boundary)
                .with_daily_summary_for(user.id),
        )
        .await;

    let window = boundary.window();
    let stack = backend
        .stacks
        .add(
            Stack::new(ids.generate_stack_id(), org.id, project.id, "a1b2c3")
                .with_title("TimeoutException: upstream did not answer"),
        )
        .await?;

    let app = backend
        .app_builder(Arc::new(clock.clone()))
        .summary_config(summary_config)
        .build()?;

    for n in 0..12i64 {
        let at = window.utc_start + Duration::hours(n * 2);
        let event = Event::new(ids.generate_event_id(), org.id, project.id, stack.id, at)
            .with_reference_id(format!("ref-{n}"));
        app.events.add(event).await?;
        app.stacks
            .increment_event_counter(org.id, project.id, stack.id, at, at, 1)
            .await?;
    }

    // (C) 日次サマリを 1 回実行
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let result = app.daily_summary.run(&shutdown_rx).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    for sent in backend.mailer.sent().await {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "to": sent.email_address,
                "summary": sent.summary,
            }))?
        );
    }

    // (D) ユーザー記述をキューに積み、consumer で消化
    let queue = Arc::new(InMemoryMessageQueue::new(queue_config.retry_policy()));
    queue
        .enqueue(
            EventUserDescription::new(project.id, "ref-3", "user@example.com", "Checkout hung")
                .with_data("browser", json!("firefox")),
        )
        .await?;
    queue
        .enqueue(EventUserDescription::new(
            project.id,
            "ref-unknown",
            "user@example.com",
            "No such event",
        ))
        .await?;

    let job: Arc<dyn QueueJob<EventUserDescription>> = app.user_descriptions.clone();
    let group = ConsumerGroup::spawn(queue_config.consumers, queue.clone(), job);

    // 完了をポーリングで待つ（completed / dead のどちらかで全件が終わるまで）
    let counts = tokio::time::timeout(StdDuration::from_secs(120), async {
        loop {
            let counts = queue.counts().await?;
            if counts.is_drained() {
                return anyhow::Ok(counts);
            }
            sleep(StdDuration::from_millis(50)).await;
        }
    })
    .await
    .context("description queue did not drain")??;
    group.shutdown_and_join().await;

    println!("queue counts: {counts:?}");
    for dead in queue.dead_letters().await {
        println!(
            "dead letter: id={} reference={} attempts={} last_error={:?}",
            dead.id, dead.value.reference_id, dead.attempts, dead.last_error
        );
    }

    let described = app
        .events
        .get_by_reference_id(project.id, "ref-3")
        .await?
        .context("ref-3 should exist")?;
    println!("{}", serde_json::to_string_pretty(&described)?);

    Ok(())
}
