use anyhow::Context;
use graphmap::graph::{Edge, EdgeSearch, Node, Tags};
use graphmap::{GraphConfig, GraphManager, JournalRebuilder, MemoryKeyStore, MemoryListStore};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => GraphConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => GraphConfig::default(),
    };

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    println!("GraphMap v{}", graphmap::version());
    println!("==========================================");
    println!();

    let keys = Arc::new(MemoryKeyStore::new());
    let lists = Arc::new(MemoryListStore::new());
    let manager = GraphManager::open(config.clone(), keys.clone(), lists.clone()).await?;

    // Demo 1: Transactional writes
    demo_transactions(&manager).await?;

    // Demo 2: Edge queries
    demo_queries(&manager).await?;

    // Demo 3: Journal rebuild
    demo_rebuild(&config, &lists).await?;

    Ok(())
}

async fn demo_transactions(manager: &GraphManager) -> anyhow::Result<()> {
    println!("=== Demo 1: Transactions ===");

    let mut tx = manager.begin().await?;
    tx.map().add_node(Node::parse("Alice", "team=core")?)?;
    tx.map().add_node(Node::parse("Bob", "team=core")?)?;
    tx.map().add_node(Node::new("Charlie")?)?;
    tx.map().add_node(Node::parse("Tag:Rust", "uniqueIndex")?)?;
    tx.map().add_edge(Edge::new_with_type("Alice", "Bob", "knows")?)?;
    tx.map().add_edge(Edge::new_with_tags(
        "Bob",
        "Charlie",
        "knows",
        Tags::parse("since=2019")?,
    )?)?;
    tx.map().add_edge(Edge::new_with_type("Alice", "Tag:Rust", "likes")?)?;
    tx.map().attach_data("Alice", "profile")?;

    if let Some(record) = tx.commit().await? {
        println!(
            "✓ Committed transaction {} with {} changes",
            record.transaction_id,
            record.entries.len()
        );
    }

    let mut tx = manager.begin().await?;
    tx.map().add_node(Node::new("Mallory")?)?;
    tx.map().add_edge(Edge::new("Mallory", "Alice")?)?;
    let undone = tx.rollback()?;
    println!("✓ Rolled back {} changes", undone);

    let map = manager.map();
    println!("\nGraph Statistics:");
    println!("  Total nodes: {}", map.node_count());
    println!("  Total edges: {}", map.edge_count());
    Ok(())
}

async fn demo_queries(manager: &GraphManager) -> anyhow::Result<()> {
    println!("\n=== Demo 2: Edge Queries ===");
    let map = manager.map();

    let around_bob = map.query_edges(&EdgeSearch::node("bob"))?;
    println!("  Edges touching Bob: {}", around_bob.len());

    let from_alice = map.query_edges(&EdgeSearch::node("alice").directed().with_type("k*"))?;
    println!("  'k*' edges leaving Alice: {}", from_alice.len());

    let since = map.query_edges(&EdgeSearch::all().with_tags(Tags::parse("since")?))?;
    println!("  Edges tagged 'since': {}", since.len());

    let mut tx = manager.begin().await?;
    let removal = tx.map().remove_node("Alice")?;
    tx.commit().await?;
    println!(
        "✓ Removed Alice: {} edges, {} orphaned nodes",
        removal.edges_removed,
        removal.orphans.len()
    );
    Ok(())
}

async fn demo_rebuild(config: &GraphConfig, lists: &MemoryListStore) -> anyhow::Result<()> {
    println!("\n=== Demo 3: Journal Rebuild ===");

    let (_cancel_tx, cancel) = watch::channel(false);
    let rebuilt = JournalRebuilder::new(config.unique_index_tag.clone())
        .build_from_journals(lists, &config.journal_key, &cancel)
        .await?;

    println!("  Rebuilt nodes: {}", rebuilt.node_count());
    println!("  Rebuilt edges: {}", rebuilt.edge_count());
    println!(
        "  Last LSN: {}",
        rebuilt.last_log_sequence_number().unwrap_or_default()
    );
    println!("  Counters: {:?}", rebuilt.counters());
    Ok(())
}
