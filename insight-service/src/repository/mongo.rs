use super::{
    AnalysisOutcome, FileRepository, IdentityField, InvoiceRepository, PlanRepository,
    RepoError, RepoResult, SessionRepository, Store, UserRepository, LOGIN_HISTORY_LIMIT,
};
use crate::models::{
    AnalysisStatus, FileRecord, Invoice, LoginRecord, Plan, PlanActivation, PlanTier, Session,
    User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Bson, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client as MongoClient, Collection, Database, IndexModel,
};
use std::time::Duration;

const DUPLICATE_KEY: i32 = 11000;
const INVOICE_COUNTER_ID: &str = "invoice_number";

fn bson_dt(dt: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_chrono(dt)
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn write_error(err: mongodb::error::Error) -> RepoError {
    if is_duplicate_key(&err) {
        RepoError::Duplicate(err.to_string())
    } else {
        RepoError::Database(err)
    }
}

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> RepoResult<Self> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            RepoError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> RepoResult<()> {
        tracing::info!("Creating MongoDB indexes for insight-service");

        let unique = |name: &str| {
            IndexOptions::builder()
                .name(name.to_string())
                .unique(true)
                .build()
        };
        // Optional identity fields are only unique when present.
        let unique_when_set = |name: &str, field: &str| {
            let mut present = Document::new();
            present.insert(field, doc! { "$type": "string" });
            IndexOptions::builder()
                .name(name.to_string())
                .unique(true)
                .partial_filter_expression(present)
                .build()
        };
        let named = |name: &str| IndexOptions::builder().name(name.to_string()).build();

        self.users()
            .create_indexes(
                [
                    IndexModel::builder()
                        .keys(doc! { "email": 1 })
                        .options(unique("users_email_unique"))
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "username": 1 })
                        .options(unique_when_set("users_username_unique", "username"))
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "phone": 1 })
                        .options(unique_when_set("users_phone_unique", "phone"))
                        .build(),
                ],
                None,
            )
            .await?;

        self.sessions()
            .create_indexes(
                [
                    IndexModel::builder()
                        .keys(doc! { "token_hash": 1 })
                        .options(unique("sessions_token_unique"))
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "user_id": 1, "last_active_at": -1 })
                        .options(named("sessions_user_lookup"))
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "expires_at": 1 })
                        .options(
                            IndexOptions::builder()
                                .name("sessions_expiry_ttl".to_string())
                                .expire_after(Duration::from_secs(0))
                                .build(),
                        )
                        .build(),
                ],
                None,
            )
            .await?;

        self.files()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "owner_id": 1, "created_at": -1 })
                    .options(named("files_owner_window"))
                    .build(),
                None,
            )
            .await?;

        self.invoices()
            .create_indexes(
                [
                    IndexModel::builder()
                        .keys(doc! { "razorpay_payment_id": 1 })
                        .options(unique("invoices_payment_unique"))
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "invoice_number": 1 })
                        .options(unique("invoices_number_unique"))
                        .build(),
                    IndexModel::builder()
                        .keys(doc! { "user_id": 1, "payment_date": -1 })
                        .options(named("invoices_user_lookup"))
                        .build(),
                ],
                None,
            )
            .await?;

        tracing::info!("insight-service indexes initialized");
        Ok(())
    }

    pub fn client(&self) -> &MongoClient {
        &self.client
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn users(&self) -> Collection<User> {
        self.db.collection("users")
    }

    fn sessions(&self) -> Collection<Session> {
        self.db.collection("sessions")
    }

    fn files(&self) -> Collection<FileRecord> {
        self.db.collection("files")
    }

    fn plans(&self) -> Collection<Plan> {
        self.db.collection("plans")
    }

    fn invoices(&self) -> Collection<Invoice> {
        self.db.collection("invoices")
    }

    fn counters(&self) -> Collection<Document> {
        self.db.collection("counters")
    }

    async fn find_many<T>(
        collection: Collection<T>,
        filter: Document,
        sort: Document,
    ) -> RepoResult<Vec<T>>
    where
        T: serde::de::DeserializeOwned + Unpin + Send + Sync,
    {
        let options = FindOptions::builder().sort(sort).build();
        let cursor = collection.find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }
}

#[async_trait]
impl UserRepository for MongoStore {
    async fn insert_user(&self, user: User) -> RepoResult<()> {
        self.users()
            .insert_one(user, None)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn find_user(&self, id: &str) -> RepoResult<Option<User>> {
        Ok(self.users().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self.users().find_one(doc! { "email": email }, None).await?)
    }

    async fn identity_in_use(&self, field: IdentityField, value: &str) -> RepoResult<bool> {
        let mut filter = Document::new();
        filter.insert(field.as_str(), value);
        let count = self.users().count_documents(filter, None).await?;
        Ok(count > 0)
    }

    async fn record_login_failure(
        &self,
        user_id: &str,
        max_attempts: u32,
        lock_until: DateTime<Utc>,
    ) -> RepoResult<()> {
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .users()
            .find_one_and_update(
                doc! { "_id": user_id },
                doc! { "$inc": { "failed_login_attempts": 1_i64 } },
                options,
            )
            .await?;

        if let Some(user) = updated {
            if user.failed_login_attempts >= max_attempts {
                self.users()
                    .update_one(
                        doc! {
                            "_id": user_id,
                            "failed_login_attempts": { "$gte": max_attempts as i64 },
                        },
                        doc! { "$set": {
                            "lock_until": bson_dt(lock_until),
                            "failed_login_attempts": 0_i64,
                        } },
                        None,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn record_login_success(&self, user_id: &str, entry: LoginRecord) -> RepoResult<()> {
        let now = bson_dt(entry.at);
        let entry = bson::to_bson(&entry)?;
        let keep_last = -(LOGIN_HISTORY_LIMIT as i64);
        self.users()
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$set": {
                        "failed_login_attempts": 0_i64,
                        "lock_until": Bson::Null,
                        "last_login": now,
                        "updated_at": now,
                    },
                    "$push": {
                        "login_history": {
                            "$each": [entry],
                            "$slice": keep_last,
                        }
                    },
                },
                None,
            )
            .await?;
        Ok(())
    }

    async fn cancel_subscription(&self, user_id: &str) -> RepoResult<bool> {
        let result = self
            .users()
            .update_one(
                doc! { "_id": user_id, "subscription_id": { "$ne": Bson::Null } },
                doc! { "$set": {
                    "plan": PlanTier::Free.as_str(),
                    "plan_expiry": Bson::Null,
                    "subscription_id": Bson::Null,
                    "payment_method": Bson::Null,
                    "updated_at": bson::DateTime::now(),
                } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }
}

#[async_trait]
impl SessionRepository for MongoStore {
    async fn insert_session(&self, session: Session) -> RepoResult<()> {
        self.sessions()
            .insert_one(session, None)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn find_session(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> RepoResult<Option<Session>> {
        Ok(self
            .sessions()
            .find_one(
                doc! { "token_hash": token_hash, "expires_at": { "$gt": bson_dt(now) } },
                None,
            )
            .await?)
    }

    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> RepoResult<()> {
        self.sessions()
            .update_one(
                doc! { "_id": session_id },
                doc! { "$set": { "last_active_at": bson_dt(now) } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn list_sessions(&self, user_id: &str, now: DateTime<Utc>) -> RepoResult<Vec<Session>> {
        Self::find_many(
            self.sessions(),
            doc! { "user_id": user_id, "expires_at": { "$gt": bson_dt(now) } },
            doc! { "last_active_at": -1 },
        )
        .await
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> RepoResult<bool> {
        let result = self
            .sessions()
            .delete_one(doc! { "_id": session_id, "user_id": user_id }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }
}

#[async_trait]
impl FileRepository for MongoStore {
    async fn insert_file(&self, file: FileRecord) -> RepoResult<()> {
        self.files()
            .insert_one(file, None)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    async fn find_file(&self, file_id: &str) -> RepoResult<Option<FileRecord>> {
        Ok(self.files().find_one(doc! { "_id": file_id }, None).await?)
    }

    async fn list_files(&self, owner_id: &str) -> RepoResult<Vec<FileRecord>> {
        Self::find_many(
            self.files(),
            doc! { "owner_id": owner_id },
            doc! { "created_at": -1 },
        )
        .await
    }

    async fn count_files_since(&self, owner_id: &str, since: DateTime<Utc>) -> RepoResult<u64> {
        Ok(self
            .files()
            .count_documents(
                doc! { "owner_id": owner_id, "created_at": { "$gte": bson_dt(since) } },
                None,
            )
            .await?)
    }

    async fn delete_file(&self, owner_id: &str, file_id: &str) -> RepoResult<bool> {
        let result = self
            .files()
            .delete_one(doc! { "_id": file_id, "owner_id": owner_id }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn try_begin_analysis(
        &self,
        owner_id: &str,
        file_id: &str,
        run_id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> RepoResult<Option<FileRecord>> {
        let filter = doc! {
            "_id": file_id,
            "owner_id": owner_id,
            "$or": [
                { "analysis_status": { "$ne": bson::to_bson(&AnalysisStatus::Processing)? } },
                { "analysis_started_at": Bson::Null },
                { "analysis_started_at": { "$lt": bson_dt(stale_before) } },
            ],
        };
        let update = doc! { "$set": {
            "analysis_status": bson::to_bson(&AnalysisStatus::Processing)?,
            "analysis_run_id": run_id,
            "analysis_started_at": bson_dt(now),
            "updated_at": bson_dt(now),
        } };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        Ok(self
            .files()
            .find_one_and_update(filter, update, options)
            .await?)
    }

    async fn finish_analysis(
        &self,
        file_id: &str,
        run_id: &str,
        outcome: AnalysisOutcome,
        now: DateTime<Utc>,
    ) -> RepoResult<bool> {
        let (status, results) = match outcome {
            AnalysisOutcome::Completed(results) => {
                (AnalysisStatus::Completed, bson::to_bson(&results)?)
            }
            AnalysisOutcome::Failed => (AnalysisStatus::Failed, Bson::Null),
        };

        let result = self
            .files()
            .update_one(
                doc! {
                    "_id": file_id,
                    "analysis_run_id": run_id,
                    "analysis_status": bson::to_bson(&AnalysisStatus::Processing)?,
                },
                doc! { "$set": {
                    "analysis_status": bson::to_bson(&status)?,
                    "analysis_results": results,
                    "updated_at": bson_dt(now),
                } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }
}

#[async_trait]
impl PlanRepository for MongoStore {
    async fn list_active_plans(&self) -> RepoResult<Vec<Plan>> {
        Self::find_many(
            self.plans(),
            doc! { "is_active": true },
            doc! { "price_minor": 1 },
        )
        .await
    }

    async fn find_plan(&self, plan_id: &str) -> RepoResult<Option<Plan>> {
        Ok(self.plans().find_one(doc! { "_id": plan_id }, None).await?)
    }

    async fn seed_plans(&self, plans: Vec<Plan>) -> RepoResult<usize> {
        if plans.is_empty() || self.plans().count_documents(doc! {}, None).await? > 0 {
            return Ok(0);
        }
        let result = self
            .plans()
            .insert_many(plans, None)
            .await
            .map_err(write_error)?;
        Ok(result.inserted_ids.len())
    }
}

#[async_trait]
impl InvoiceRepository for MongoStore {
    async fn next_invoice_sequence(&self) -> RepoResult<i64> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let counter = self
            .counters()
            .find_one_and_update(
                doc! { "_id": INVOICE_COUNTER_ID },
                doc! { "$inc": { "seq": 1_i64 } },
                options,
            )
            .await?
            .ok_or_else(|| RepoError::Other("invoice counter upsert returned nothing".into()))?;

        counter
            .get_i64("seq")
            .map_err(|e| RepoError::Other(format!("invalid invoice counter: {}", e)))
    }

    async fn activate_plan(&self, invoice: Invoice, activation: PlanActivation) -> RepoResult<()> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let invoice_id = invoice.id.clone();
        let result: RepoResult<()> = async {
            self.invoices()
                .insert_one_with_session(&invoice, None, &mut session)
                .await
                .map_err(write_error)?;

            let now = bson::DateTime::now();
            let updated = self
                .users()
                .update_one_with_session(
                    doc! { "_id": activation.user_id.as_str() },
                    doc! {
                        "$set": {
                            "plan": activation.plan.as_str(),
                            "plan_expiry": bson_dt(activation.plan_expiry),
                            "subscription_id": activation.subscription_id.as_str(),
                            "payment_method": activation.payment_method.as_str(),
                            "updated_at": now,
                        },
                        "$push": { "invoice_ids": invoice_id.as_str() },
                    },
                    None,
                    &mut session,
                )
                .await?;

            if updated.matched_count == 0 {
                return Err(RepoError::Other(format!(
                    "user {} disappeared during plan activation",
                    activation.user_id
                )));
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                session.commit_transaction().await.map_err(write_error)?;
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    tracing::warn!(error = %abort_err, "Failed to abort plan activation transaction");
                }
                Err(e)
            }
        }
    }

    async fn list_invoices(&self, user_id: &str) -> RepoResult<Vec<Invoice>> {
        Self::find_many(
            self.invoices(),
            doc! { "user_id": user_id },
            doc! { "payment_date": -1 },
        )
        .await
    }

    async fn find_invoice(&self, user_id: &str, invoice_id: &str) -> RepoResult<Option<Invoice>> {
        Ok(self
            .invoices()
            .find_one(doc! { "_id": invoice_id, "user_id": user_id }, None)
            .await?)
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn health_check(&self) -> RepoResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                RepoError::from(e)
            })?;
        Ok(())
    }
}
