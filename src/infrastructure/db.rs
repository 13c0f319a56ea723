use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};

pub async fn init_db(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;

    // Run migrations manually (simple SQL)
    run_migrations(&db).await?;

    Ok(db)
}

async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS authors (
            id TEXT PRIMARY KEY NOT NULL,
            full_name TEXT NOT NULL,
            dob TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        // Exact, case-sensitive match (BINARY collation)
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_authors_full_name ON authors(full_name)",
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id TEXT PRIMARY KEY NOT NULL,
            remote_id TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL,
            author_id TEXT REFERENCES authors(id) ON DELETE SET NULL,
            author_position INTEGER NOT NULL DEFAULT 0,
            description TEXT NOT NULL DEFAULT '',
            summary TEXT NOT NULL DEFAULT '',
            language TEXT NOT NULL DEFAULT 'en',
            rating REAL NOT NULL DEFAULT 0.0,
            rating_count INTEGER NOT NULL DEFAULT 0,
            publisher TEXT NOT NULL DEFAULT '',
            publish_date TEXT NOT NULL DEFAULT '',
            pages INTEGER NOT NULL DEFAULT 0,
            categories TEXT NOT NULL DEFAULT '[]',
            price REAL NOT NULL DEFAULT 0.0,
            currency TEXT NOT NULL DEFAULT 'USD',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        // Drafts share the empty remote id, synced books must not
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_books_remote_id ON books(remote_id) WHERE remote_id <> ''",
        "CREATE INDEX IF NOT EXISTS idx_books_author ON books(author_id, author_position)",
        r#"
        CREATE TABLE IF NOT EXISTS book_images (
            book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            url TEXT NOT NULL,
            kind TEXT NOT NULL DEFAULT 'cover',
            PRIMARY KEY (book_id, position)
        )
        "#,
    ];

    for sql in statements {
        db.execute(Statement::from_string(
            db.get_database_backend(),
            sql.to_owned(),
        ))
        .await?;
    }

    tracing::debug!("Local store schema ready");
    Ok(())
}
