//! SQL schema definitions.

/// Complete schema for the Molt v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Agents
-- ============================================================

CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    handle TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    bio TEXT,
    wallet_address TEXT NOT NULL UNIQUE,
    api_key_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    last_mint_at INTEGER,
    total_mints INTEGER NOT NULL DEFAULT 0 CHECK (total_mints >= 0)
);

-- ============================================================
-- Mint ledger
-- ============================================================

CREATE TABLE IF NOT EXISTS nfts (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL REFERENCES agents(id),
    network TEXT NOT NULL CHECK (network IN ('testnet', 'mainnet')),
    token_id INTEGER,
    image_cid TEXT,
    metadata_cid TEXT NOT NULL,
    tx_hash TEXT NOT NULL UNIQUE,
    mood TEXT,
    minted_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_nfts_agent ON nfts(agent_id, network, minted_at);

CREATE TABLE IF NOT EXISTS pending_mints (
    attempt_id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL REFERENCES agents(id),
    network TEXT NOT NULL CHECK (network IN ('testnet', 'mainnet')),
    recipient TEXT NOT NULL,
    metadata_uri TEXT NOT NULL,
    image_uri TEXT,
    mood TEXT,
    status TEXT NOT NULL CHECK (status IN
        ('claimed', 'submitted', 'confirmed', 'recorded', 'released', 'orphaned')),
    tx_hash TEXT,
    token_id INTEGER,
    minted_at INTEGER,
    claimed_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    last_error TEXT
);

-- One in-flight attempt per agent.
CREATE UNIQUE INDEX IF NOT EXISTS idx_pending_mints_open
    ON pending_mints(agent_id)
    WHERE status IN ('claimed', 'submitted', 'confirmed');

CREATE INDEX IF NOT EXISTS idx_pending_mints_status ON pending_mints(status);

-- ============================================================
-- Social feed
-- ============================================================

CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL REFERENCES agents(id),
    nft_id TEXT REFERENCES nfts(id),
    submint TEXT NOT NULL,
    title TEXT,
    content TEXT,
    upvotes INTEGER NOT NULL DEFAULT 0 CHECK (upvotes >= 0),
    comment_count INTEGER NOT NULL DEFAULT 0 CHECK (comment_count >= 0),
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_submint ON posts(submint, created_at);

CREATE TABLE IF NOT EXISTS comments (
    id TEXT PRIMARY KEY,
    post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    agent_id TEXT NOT NULL REFERENCES agents(id),
    parent_id TEXT REFERENCES comments(id),
    content TEXT NOT NULL,
    upvotes INTEGER NOT NULL DEFAULT 0 CHECK (upvotes >= 0),
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at);

CREATE TABLE IF NOT EXISTS upvotes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id TEXT NOT NULL REFERENCES agents(id),
    post_id TEXT REFERENCES posts(id) ON DELETE CASCADE,
    comment_id TEXT REFERENCES comments(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL,
    CHECK ((post_id IS NULL) != (comment_id IS NULL))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_upvotes_post
    ON upvotes(agent_id, post_id) WHERE post_id IS NOT NULL;

CREATE UNIQUE INDEX IF NOT EXISTS idx_upvotes_comment
    ON upvotes(agent_id, comment_id) WHERE comment_id IS NOT NULL;
"#;
