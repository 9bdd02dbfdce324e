pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- blogs table
CREATE TABLE IF NOT EXISTS blogs (
    id TEXT PRIMARY KEY,
    source_key TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    description TEXT,
    feed_url TEXT NOT NULL,
    site_url TEXT,
    post_count INTEGER NOT NULL DEFAULT 0,
    earliest_post TEXT,
    latest_post TEXT,
    imported_at TEXT NOT NULL,
    import_source TEXT NOT NULL,
    total_words INTEGER NOT NULL DEFAULT 0
);

-- posts table
CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY,
    blog_id TEXT NOT NULL REFERENCES blogs(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    link TEXT NOT NULL,
    author TEXT,
    published_at TEXT,
    content_html TEXT,
    content_text TEXT,
    word_count INTEGER NOT NULL DEFAULT 0,
    reading_time INTEGER NOT NULL DEFAULT 0,
    is_full_text INTEGER NOT NULL DEFAULT 0,
    summary TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(blog_id, link)
);

CREATE INDEX IF NOT EXISTS idx_posts_blog_id ON posts(blog_id);
CREATE INDEX IF NOT EXISTS idx_posts_published_at ON posts(published_at DESC);

-- post_tags table
CREATE TABLE IF NOT EXISTS post_tags (
    post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    tag TEXT NOT NULL CHECK (length(tag) BETWEEN 1 AND 64),
    PRIMARY KEY (post_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_post_tags_tag ON post_tags(tag);

-- import_jobs table
CREATE TABLE IF NOT EXISTS import_jobs (
    id TEXT PRIMARY KEY,
    blog_id TEXT REFERENCES blogs(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    source TEXT NOT NULL,
    status TEXT NOT NULL,
    imported_items INTEGER NOT NULL DEFAULT 0,
    total_items INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT
);

-- reading_progress table
CREATE TABLE IF NOT EXISTS reading_progress (
    post_id TEXT PRIMARY KEY REFERENCES posts(id) ON DELETE CASCADE,
    position REAL NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- reading_sessions table
CREATE TABLE IF NOT EXISTS reading_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
    started_at TEXT NOT NULL,
    duration_secs INTEGER NOT NULL
);

-- full-text index over post title and body, maintained by the importers
CREATE VIRTUAL TABLE IF NOT EXISTS posts_fts USING fts5(
    post_id UNINDEXED,
    title,
    body
);
"#;
