//! Product and photo set API routes.
//!
//! Uploads are a two-phase flow: `POST /products/:id/photos` validates the
//! bytes and writes renditions, returning a content hash; a later
//! `POST /products/:id/photos/commit` applies the staged batch atomically
//! against the expected photo set version. Rendition files are served by
//! content hash and are immutable.

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use std::collections::HashMap;
use tokio_util::io::ReaderStream;
use vitrine_common::{Error, PhotoId, PhotoSetVersion, ProductId, SizeTag};
use vitrine_db::queries::{photos, products, uploads};

use super::{error_response, AppContext};
use crate::photos::{EditSession, PhotoDescriptor};

/// Create product and photo routes.
pub fn photo_routes() -> Router<AppContext> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/:product_id", delete(delete_product))
        .route(
            "/products/:product_id/photos",
            get(list_photos).post(upload_photo),
        )
        .route("/products/:product_id/photos/commit", post(commit_photos))
        .route("/photos/:content_hash/:size", get(serve_rendition))
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
}

/// A batch of staged edits to apply against an expected photo set version.
///
/// `deletions`, `order` and `primary` accept either a photo ID or a content
/// hash; content hashes also resolve to photos added in this same batch.
/// Unrecognized keys are rejected outright: an edit batch with a misspelled
/// operation must not half-apply.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommitRequest {
    /// Photo set version the client last saw.
    pub base_version: i64,

    /// Content hashes of previously uploaded images to add.
    #[serde(default)]
    pub additions: Vec<String>,

    /// Photos to remove.
    #[serde(default)]
    pub deletions: Vec<String>,

    /// Full desired ordering of the resulting set.
    #[serde(default)]
    pub order: Option<Vec<String>>,

    /// Photo to mark as primary.
    #[serde(default)]
    pub primary: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a product with an empty photo set.
async fn create_product(
    State(ctx): State<AppContext>,
    Json(req): Json<CreateProductRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() {
        return error_response(Error::invalid_input("product name cannot be empty"));
    }

    let conn = match ctx.db_pool.get() {
        Ok(c) => c,
        Err(e) => return error_response(Error::database(e.to_string())),
    };

    match products::create_product(&conn, req.name.trim()) {
        Ok(product) => (StatusCode::CREATED, Json(product)).into_response(),
        Err(e) => error_response(e),
    }
}

/// List all products.
async fn list_products(State(ctx): State<AppContext>) -> impl IntoResponse {
    let conn = match ctx.db_pool.get() {
        Ok(c) => c,
        Err(e) => return error_response(Error::database(e.to_string())),
    };

    match products::list_products(&conn) {
        Ok(list) => Json(list).into_response(),
        Err(e) => error_response(e),
    }
}

/// Delete a product. Photo rows cascade; rendition files are left for the
/// orphan sweeper, which reclaims them once no other product references
/// their hashes.
async fn delete_product(
    State(ctx): State<AppContext>,
    Path(product_id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_product_id(&product_id) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };

    let mut conn = match ctx.db_pool.get() {
        Ok(c) => c,
        Err(e) => return error_response(Error::database(e.to_string())),
    };

    match remove_product(&mut conn, id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(Error::not_found(format!("product {id}"))),
        Err(e) => error_response(e),
    }
}

/// Delete a product and re-ledger its committed photo hashes.
///
/// Cascading the photos table would strand their rendition files, so each
/// committed hash is written back to the uploads ledger with a fresh
/// timestamp. The sweeper then removes the files after the usual TTL unless
/// another product still references them.
fn remove_product(conn: &mut rusqlite::Connection, id: ProductId) -> Result<bool, Error> {
    let tx = conn
        .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
        .map_err(|e| Error::database(e.to_string()))?;

    // The reference counts decide how much cleanup the delete needs: only
    // committed photos require re-ledgering their hashes for the sweeper.
    let refs = products::references_to(&tx, id)?;
    let committed = if refs.iter().any(|(table, count)| *table == "photos" && *count > 0) {
        photos::get_photos_for_product(&tx, id)?
    } else {
        Vec::new()
    };
    for (table, count) in &refs {
        if *count > 0 {
            tracing::debug!(product_id = %id, table = *table, count = *count, "removing rows with product");
        }
    }

    if !products::delete_product(&tx, id)? {
        return Ok(false);
    }

    let now = chrono::Utc::now();
    for photo in committed {
        uploads::upsert_upload(
            &tx,
            &vitrine_db::models::Upload {
                content_hash: photo.content_hash,
                product_id: id,
                width: photo.width,
                height: photo.height,
                renditions: photo.renditions,
                created_at: now,
            },
        )?;
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(true)
}

/// List a product's committed photos along with the photo set version the
/// client should echo back on commit.
async fn list_photos(
    State(ctx): State<AppContext>,
    Path(product_id): Path<String>,
) -> impl IntoResponse {
    let id = match parse_product_id(&product_id) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };

    let conn = match ctx.db_pool.get() {
        Ok(c) => c,
        Err(e) => return error_response(Error::database(e.to_string())),
    };

    let version = match products::get_photo_set_version(&conn, id) {
        Ok(Some(v)) => v,
        Ok(None) => return error_response(Error::not_found(format!("product {id}"))),
        Err(e) => return error_response(e),
    };

    match photos::get_photos_for_product(&conn, id) {
        Ok(list) => Json(serde_json::json!({
            "version": version,
            "photos": list,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Validate and store an uploaded image.
///
/// The raw body is the image bytes; the declared type comes from the
/// `Content-Type` header. Returns the content hash and rendition paths.
/// Nothing is attached to the product until a commit references the hash.
async fn upload_photo(
    State(ctx): State<AppContext>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let id = match parse_product_id(&product_id) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };

    let declared_mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    // Decode and resize off the async runtime
    let ingest = ctx.ingest.clone();
    let result =
        tokio::task::spawn_blocking(move || ingest.ingest(id, &body, &declared_mime)).await;

    match result {
        Ok(Ok(descriptor)) => (StatusCode::CREATED, Json(descriptor)).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => error_response(Error::internal(e.to_string())),
    }
}

/// Apply a batch of staged edits atomically.
///
/// Succeeds only if the product's photo set version still matches
/// `base_version`; a stale client gets 409 and must refresh. On success the
/// response carries the new version and the committed set.
async fn commit_photos(
    State(ctx): State<AppContext>,
    Path(product_id): Path<String>,
    Json(req): Json<CommitRequest>,
) -> impl IntoResponse {
    let id = match parse_product_id(&product_id) {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };

    let session = {
        let conn = match ctx.db_pool.get() {
            Ok(c) => c,
            Err(e) => return error_response(Error::database(e.to_string())),
        };
        match build_session(&conn, &ctx, id, &req) {
            Ok(s) => s,
            Err(e) => return error_response(e),
        }
    };

    match ctx.commits.commit(&session) {
        Ok(committed) => Json(serde_json::json!({
            "version": committed.version,
            "photos": committed.photos,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// Serve a rendition file by content hash and size tag.
///
/// Renditions are content-addressed, so the response is immutable and
/// cacheable forever.
async fn serve_rendition(
    State(ctx): State<AppContext>,
    Path((content_hash, size)): Path<(String, String)>,
) -> impl IntoResponse {
    // Hashes are exactly 16 lowercase hex chars; anything else never names
    // a stored file and must not reach the filesystem.
    if content_hash.len() != 16
        || !content_hash
            .chars()
            .all(|c| matches!(c, '0'..='9' | 'a'..='f'))
    {
        return error_response(Error::invalid_input("invalid content hash"));
    }

    let tag = match SizeTag::parse(&size) {
        Some(t) => t,
        None => {
            return error_response(Error::invalid_input(
                "invalid size. Valid values: thumb, small, medium, large",
            ))
        }
    };

    let path = ctx.store.rendition_path(&content_hash, tag);

    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(_) => return error_response(Error::not_found(format!("rendition {content_hash}"))),
    };

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    (
        StatusCode::OK,
        [
            (
                header::CACHE_CONTROL,
                "public, max-age=31536000, immutable",
            ),
            (header::CONTENT_TYPE, "image/jpeg"),
        ],
        body,
    )
        .into_response()
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_product_id(s: &str) -> Result<ProductId, Error> {
    s.parse::<uuid::Uuid>()
        .map(ProductId::from)
        .map_err(|_| Error::invalid_input("invalid product ID"))
}

/// Translate a commit request into a staged edit session.
///
/// Staging order is deletions, then additions, then reorder, then primary,
/// so a deletion frees a slot for an addition in the same batch and the
/// ordering can reference freshly added photos. An empty batch is rejected
/// rather than committed as a bare version bump.
fn build_session(
    conn: &rusqlite::Connection,
    ctx: &AppContext,
    product_id: ProductId,
    req: &CommitRequest,
) -> Result<EditSession, Error> {
    if products::get_photo_set_version(conn, product_id)?.is_none() {
        return Err(Error::not_found(format!("product {product_id}")));
    }

    let base = photos::get_photos_for_product(conn, product_id)?;

    // Committed photos are addressable by hash as well as by ID
    let mut by_hash: HashMap<String, PhotoId> = base
        .iter()
        .map(|p| (p.content_hash.clone(), p.id))
        .collect();

    let mut session = EditSession::open(product_id, base, PhotoSetVersion::new(req.base_version));

    for entry in &req.deletions {
        let id = resolve_photo_ref(entry, &by_hash)?;
        session.stage_delete(id)?;
    }

    for hash in &req.additions {
        let descriptor = descriptor_for_upload(conn, ctx, product_id, hash)?;
        let id = session.stage_add(descriptor)?;
        by_hash.insert(hash.clone(), id);
    }

    if let Some(ref order) = req.order {
        let ids = order
            .iter()
            .map(|entry| resolve_photo_ref(entry, &by_hash))
            .collect::<Result<Vec<_>, _>>()?;
        session.stage_reorder(ids)?;
    }

    if let Some(ref primary) = req.primary {
        let id = resolve_photo_ref(primary, &by_hash)?;
        session.stage_set_primary(id)?;
    }

    if !session.has_staged_ops() {
        return Err(Error::invalid_input("commit batch contains no operations"));
    }

    Ok(session)
}

/// Resolve a photo reference that is either a photo ID or a content hash.
fn resolve_photo_ref(entry: &str, by_hash: &HashMap<String, PhotoId>) -> Result<PhotoId, Error> {
    if let Ok(uuid) = entry.parse::<uuid::Uuid>() {
        return Ok(PhotoId::from(uuid));
    }
    by_hash
        .get(entry)
        .copied()
        .ok_or_else(|| Error::invalid_input(format!("unknown photo reference: {entry}")))
}

/// Look up the stored upload for a content hash referenced by a commit.
fn descriptor_for_upload(
    conn: &rusqlite::Connection,
    ctx: &AppContext,
    product_id: ProductId,
    content_hash: &str,
) -> Result<PhotoDescriptor, Error> {
    let upload = uploads::find_upload(conn, product_id, content_hash)?
        .ok_or_else(|| Error::invalid_input(format!("no upload with hash {content_hash}")))?;

    if !ctx.store.has_renditions(content_hash) {
        return Err(Error::storage(format!(
            "renditions missing for {content_hash}"
        )));
    }

    Ok(PhotoDescriptor {
        content_hash: upload.content_hash,
        width: upload.width.unwrap_or_default(),
        height: upload.height.unwrap_or_default(),
        renditions: upload.renditions,
    })
}
