use async_trait::async_trait;
use chrono::Utc;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Result, Row, TransactionBehavior};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::migrations::run_migrations;
use super::models::{
    Account, AccountPatch, ApprovalOutcome, Counter, NewAccount, ReserveOutcome, WithdrawalContact,
    WithdrawalRequest, WithdrawalStatus,
};
use super::store::AccountStore;
use crate::core::error::{AppError, AppResult};
use crate::core::fees::FeePolicy;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and runs schema migrations.
///
/// # Arguments
///
/// * `database_path` - Path to SQLite database file
///
/// # Example
///
/// ```no_run
/// use tonaltcore::storage::db;
///
/// let pool = db::create_pool("tonalt.sqlite")?;
/// # Ok::<(), tonaltcore::AppError>(())
/// ```
pub fn create_pool(database_path: &str) -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
    });
    let pool = Pool::builder().max_size(10).build(manager)?;

    let mut conn = pool.get()?;
    run_migrations(&mut *conn)?;

    Ok(pool)
}

/// Get a connection from the pool
pub fn get_connection(pool: &DbPool) -> AppResult<DbConnection> {
    Ok(pool.get()?)
}

const ACCOUNT_COLUMNS: &str = "user_id, username, approved, payment_link_opened, payment_email, balance, \
                               earnings, referral_count, referred_by, pending_withdrawal, created_at";

const WITHDRAWAL_COLUMNS: &str = "id, user_id, name, phone, gross, fee, net, status, created_at, resolved_at";

fn account_from_row(row: &Row<'_>) -> Result<Account> {
    Ok(Account {
        user_id: row.get(0)?,
        username: row.get(1)?,
        approved: row.get(2)?,
        payment_link_opened: row.get(3)?,
        payment_email: row.get(4)?,
        balance: row.get(5)?,
        earnings: row.get(6)?,
        referral_count: row.get(7)?,
        referred_by: row.get(8)?,
        pending_withdrawal: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn withdrawal_from_row(row: &Row<'_>) -> Result<WithdrawalRequest> {
    let status: String = row.get(7)?;
    let status = WithdrawalStatus::from_str(&status)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e)))?;
    Ok(WithdrawalRequest {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        gross: row.get(4)?,
        fee: row.get(5)?,
        net: row.get(6)?,
        status,
        created_at: row.get(8)?,
        resolved_at: row.get(9)?,
    })
}

/// Fetch an account by user id.
pub fn get_account(conn: &Connection, user_id: i64) -> Result<Option<Account>> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE user_id = ?1"),
        params![user_id],
        account_from_row,
    )
    .optional()
}

/// Upsert a whole account. An existing `referred_by` is never overwritten.
pub fn put_account(conn: &Connection, account: &Account) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO users ({ACCOUNT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(user_id) DO UPDATE SET
               username = excluded.username,
               approved = excluded.approved,
               payment_link_opened = excluded.payment_link_opened,
               payment_email = excluded.payment_email,
               balance = excluded.balance,
               earnings = excluded.earnings,
               referral_count = excluded.referral_count,
               referred_by = COALESCE(users.referred_by, excluded.referred_by),
               pending_withdrawal = excluded.pending_withdrawal"
        ),
        params![
            account.user_id,
            account.username,
            account.approved,
            account.payment_link_opened,
            account.payment_email,
            account.balance,
            account.earnings,
            account.referral_count,
            account.referred_by,
            account.pending_withdrawal,
            account.created_at,
        ],
    )?;
    Ok(())
}

/// Apply the non-`None` fields of `patch`.
pub fn update_account(conn: &Connection, user_id: i64, patch: &AccountPatch) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET
           approved = COALESCE(?2, approved),
           payment_link_opened = COALESCE(?3, payment_link_opened),
           payment_email = COALESCE(?4, payment_email),
           pending_withdrawal = COALESCE(?5, pending_withdrawal)
         WHERE user_id = ?1",
        params![
            user_id,
            patch.approved,
            patch.payment_link_opened,
            patch.payment_email,
            patch.pending_withdrawal
        ],
    )?;
    Ok(changed == 1)
}

/// Atomic `counter += delta`, refused when the result would be negative.
pub fn increment_counter(conn: &Connection, user_id: i64, counter: Counter, delta: i64) -> Result<bool> {
    let column = counter.column();
    let changed = conn.execute(
        &format!("UPDATE users SET {column} = {column} + ?2 WHERE user_id = ?1 AND {column} + ?2 >= 0"),
        params![user_id, delta],
    )?;
    Ok(changed == 1)
}

/// Insert the account unless it exists, in one transaction.
pub fn create_account_if_absent(conn: &mut Connection, new: &NewAccount) -> Result<(Account, bool)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    // The referrer is kept only if it names another existing account
    let inserted = tx.execute(
        "INSERT INTO users (user_id, username, referred_by, created_at)
         VALUES (?1, ?2, (SELECT user_id FROM users WHERE user_id = ?3 AND user_id != ?1), ?4)
         ON CONFLICT(user_id) DO NOTHING",
        params![new.user_id, new.username, new.referred_by, Utc::now()],
    )?;
    let account = get_account(&tx, new.user_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
    tx.commit()?;
    Ok((account, inserted == 1))
}

/// Reward guard: insert the (referrer, referee) pair and credit the referrer, or do nothing.
pub fn reward_referrer_once(conn: &mut Connection, referrer_id: i64, referee_id: i64, amount: i64) -> Result<bool> {
    if referrer_id == referee_id {
        return Ok(false);
    }
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let inserted = tx.execute(
        "INSERT INTO rewarded_referrals (referrer_id, referee_id, amount, rewarded_at)
         SELECT ?1, ?2, ?3, ?4 WHERE EXISTS (SELECT 1 FROM users WHERE user_id = ?1)
         ON CONFLICT(referrer_id, referee_id) DO NOTHING",
        params![referrer_id, referee_id, amount, Utc::now()],
    )?;
    if inserted == 0 {
        return Ok(false);
    }
    tx.execute(
        "UPDATE users SET
           balance = balance + ?2,
           earnings = earnings + ?2,
           referral_count = referral_count + 1
         WHERE user_id = ?1",
        params![referrer_id, amount],
    )?;
    tx.commit()?;
    Ok(true)
}

pub fn rewarded_referees(conn: &Connection, referrer_id: i64) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT referee_id FROM rewarded_referrals WHERE referrer_id = ?1 ORDER BY referee_id")?;
    let rows = stmt.query_map(params![referrer_id], |row| row.get(0))?;
    rows.collect()
}

pub fn approve_account(conn: &mut Connection, user_id: i64) -> Result<ApprovalOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let Some(mut account) = get_account(&tx, user_id)? else {
        return Ok(ApprovalOutcome::NotFound);
    };
    if account.approved {
        return Ok(ApprovalOutcome::AlreadyApproved(account));
    }
    tx.execute("UPDATE users SET approved = 1 WHERE user_id = ?1", params![user_id])?;
    tx.commit()?;
    account.approved = true;
    Ok(ApprovalOutcome::Approved(account))
}

/// Check-and-reserve for a withdrawal, in one IMMEDIATE transaction.
pub fn reserve_withdrawal(
    conn: &mut Connection,
    user_id: i64,
    contact: &WithdrawalContact,
    min_withdraw: i64,
    policy: &FeePolicy,
) -> Result<ReserveOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let Some(account) = get_account(&tx, user_id)? else {
        return Ok(ReserveOutcome::NotFound);
    };
    if !account.approved {
        return Ok(ReserveOutcome::NotApproved);
    }
    if account.pending_withdrawal {
        return Ok(ReserveOutcome::AlreadyPending);
    }
    if account.balance < min_withdraw {
        return Ok(ReserveOutcome::BelowMinimum {
            balance: account.balance,
        });
    }

    let split = policy.breakdown(account.balance);
    let created_at = Utc::now();
    tx.execute(
        "UPDATE users SET balance = 0, pending_withdrawal = 1 WHERE user_id = ?1",
        params![user_id],
    )?;
    tx.execute(
        "INSERT INTO withdrawals (user_id, name, phone, gross, fee, net, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            user_id,
            contact.name,
            contact.phone,
            split.gross,
            split.fee,
            split.net,
            WithdrawalStatus::Pending.as_ref(),
            created_at
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    Ok(ReserveOutcome::Reserved(WithdrawalRequest {
        id,
        user_id,
        name: contact.name.clone(),
        phone: contact.phone.clone(),
        gross: split.gross,
        fee: split.fee,
        net: split.net,
        status: WithdrawalStatus::Pending,
        created_at,
        resolved_at: None,
    }))
}

/// Move the user's pending request to `status`. Declining refunds the gross amount.
pub fn resolve_withdrawal(
    conn: &mut Connection,
    user_id: i64,
    status: WithdrawalStatus,
) -> Result<Option<WithdrawalRequest>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let pending = tx
        .query_row(
            &format!("SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE user_id = ?1 AND status = ?2"),
            params![user_id, WithdrawalStatus::Pending.as_ref()],
            withdrawal_from_row,
        )
        .optional()?;
    let Some(mut request) = pending else {
        return Ok(None);
    };

    let resolved_at = Utc::now();
    tx.execute(
        "UPDATE withdrawals SET status = ?2, resolved_at = ?3 WHERE id = ?1",
        params![request.id, status.as_ref(), resolved_at],
    )?;
    let refund = if status == WithdrawalStatus::Declined { request.gross } else { 0 };
    tx.execute(
        "UPDATE users SET pending_withdrawal = 0, balance = balance + ?2 WHERE user_id = ?1",
        params![user_id, refund],
    )?;
    tx.commit()?;

    request.status = status;
    request.resolved_at = Some(resolved_at);
    Ok(Some(request))
}

fn query_withdrawals(conn: &Connection, filter: &str, params: impl rusqlite::Params) -> Result<Vec<WithdrawalRequest>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {WITHDRAWAL_COLUMNS} FROM withdrawals WHERE {filter} ORDER BY id"
    ))?;
    let rows = stmt.query_map(params, withdrawal_from_row)?;
    rows.collect()
}

pub fn pending_withdrawals(conn: &Connection) -> Result<Vec<WithdrawalRequest>> {
    query_withdrawals(conn, "status = ?1", params![WithdrawalStatus::Pending.as_ref()])
}

pub fn withdrawals_for_user(conn: &Connection, user_id: i64) -> Result<Vec<WithdrawalRequest>> {
    query_withdrawals(conn, "user_id = ?1", params![user_id])
}

/// [`AccountStore`] backed by SQLite through an r2d2 pool.
///
/// Blocking SQLite calls run on tokio's blocking thread pool.
#[derive(Clone)]
pub struct SqliteAccountStore {
    pool: Arc<DbPool>,
}

impl SqliteAccountStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Open (and migrate) the database at `database_path`.
    pub fn open(database_path: &str) -> AppResult<Self> {
        Ok(Self::new(Arc::new(create_pool(database_path)?)))
    }

    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || -> AppResult<T> {
            let mut conn = get_connection(&pool)?;
            Ok(f(&mut *conn)?)
        })
        .await?
    }
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn get(&self, user_id: i64) -> AppResult<Option<Account>> {
        self.with_conn(move |conn| get_account(conn, user_id)).await
    }

    async fn put(&self, account: Account) -> AppResult<()> {
        if account.balance < 0 {
            return Err(AppError::Store(format!("negative balance for user {}", account.user_id)));
        }
        self.with_conn(move |conn| put_account(conn, &account)).await
    }

    async fn update(&self, user_id: i64, patch: AccountPatch) -> AppResult<bool> {
        self.with_conn(move |conn| update_account(conn, user_id, &patch)).await
    }

    async fn increment(&self, user_id: i64, counter: Counter, delta: i64) -> AppResult<bool> {
        self.with_conn(move |conn| increment_counter(conn, user_id, counter, delta))
            .await
    }

    async fn create_if_absent(&self, new: NewAccount) -> AppResult<(Account, bool)> {
        self.with_conn(move |conn| create_account_if_absent(conn, &new)).await
    }

    async fn reward_referrer_once(&self, referrer_id: i64, referee_id: i64, amount: i64) -> AppResult<bool> {
        self.with_conn(move |conn| reward_referrer_once(conn, referrer_id, referee_id, amount))
            .await
    }

    async fn rewarded_referees(&self, referrer_id: i64) -> AppResult<Vec<i64>> {
        self.with_conn(move |conn| rewarded_referees(conn, referrer_id)).await
    }

    async fn approve(&self, user_id: i64) -> AppResult<ApprovalOutcome> {
        self.with_conn(move |conn| approve_account(conn, user_id)).await
    }

    async fn reserve_withdrawal(
        &self,
        user_id: i64,
        contact: WithdrawalContact,
        min_withdraw: i64,
        policy: FeePolicy,
    ) -> AppResult<ReserveOutcome> {
        self.with_conn(move |conn| reserve_withdrawal(conn, user_id, &contact, min_withdraw, &policy))
            .await
    }

    async fn complete_withdrawal(&self, user_id: i64) -> AppResult<Option<WithdrawalRequest>> {
        self.with_conn(move |conn| resolve_withdrawal(conn, user_id, WithdrawalStatus::Paid))
            .await
    }

    async fn decline_withdrawal(&self, user_id: i64) -> AppResult<Option<WithdrawalRequest>> {
        self.with_conn(move |conn| resolve_withdrawal(conn, user_id, WithdrawalStatus::Declined))
            .await
    }

    async fn pending_withdrawals(&self) -> AppResult<Vec<WithdrawalRequest>> {
        self.with_conn(|conn| pending_withdrawals(conn)).await
    }

    async fn withdrawals_for(&self, user_id: i64) -> AppResult<Vec<WithdrawalRequest>> {
        self.with_conn(move |conn| withdrawals_for_user(conn, user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn make_store() -> (TempDir, SqliteAccountStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        let store = SqliteAccountStore::open(path.to_str().unwrap()).unwrap();
        (dir, store)
    }

    fn contact() -> WithdrawalContact {
        WithdrawalContact {
            name: "Jane Doe".into(),
            phone: "0712345678".into(),
        }
    }

    async fn approved_with_balance(store: &SqliteAccountStore, user_id: i64, balance: i64) {
        let mut account = Account::new(user_id, None);
        account.approved = true;
        account.balance = balance;
        store.put(account).await.unwrap();
    }

    #[tokio::test]
    async fn create_if_absent_is_idempotent() {
        let (_dir, store) = make_store();
        let new = NewAccount {
            user_id: 42,
            username: Some("jane".into()),
            referred_by: None,
        };
        let (first, created) = store.create_if_absent(new.clone()).await.unwrap();
        assert!(created);
        store
            .update(
                42,
                AccountPatch {
                    payment_link_opened: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let (second, created_again) = store.create_if_absent(new).await.unwrap();
        assert!(!created_again);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.payment_link_opened, "second create must not reset fields");
    }

    #[tokio::test]
    async fn referred_by_requires_existing_other_account() {
        let (_dir, store) = make_store();
        store.put(Account::new(7, None)).await.unwrap();

        let (with_ref, _) = store
            .create_if_absent(NewAccount {
                user_id: 42,
                username: None,
                referred_by: Some(7),
            })
            .await
            .unwrap();
        assert_eq!(with_ref.referred_by, Some(7));

        let (ghost, _) = store
            .create_if_absent(NewAccount {
                user_id: 43,
                username: None,
                referred_by: Some(999),
            })
            .await
            .unwrap();
        assert_eq!(ghost.referred_by, None);

        let (selfish, _) = store
            .create_if_absent(NewAccount {
                user_id: 44,
                username: None,
                referred_by: Some(44),
            })
            .await
            .unwrap();
        assert_eq!(selfish.referred_by, None);
    }

    #[tokio::test]
    async fn put_keeps_existing_referrer() {
        let (_dir, store) = make_store();
        store.put(Account::new(7, None)).await.unwrap();
        store
            .create_if_absent(NewAccount {
                user_id: 42,
                username: None,
                referred_by: Some(7),
            })
            .await
            .unwrap();

        let mut overwrite = Account::new(42, None);
        overwrite.referred_by = Some(8);
        store.put(overwrite).await.unwrap();
        assert_eq!(store.get(42).await.unwrap().unwrap().referred_by, Some(7));
    }

    #[tokio::test]
    async fn reward_is_applied_once() {
        let (_dir, store) = make_store();
        store.put(Account::new(7, None)).await.unwrap();

        assert!(store.reward_referrer_once(7, 42, 100).await.unwrap());
        assert!(!store.reward_referrer_once(7, 42, 100).await.unwrap());
        assert!(!store.reward_referrer_once(7, 7, 100).await.unwrap());
        assert!(!store.reward_referrer_once(999, 42, 100).await.unwrap());

        let referrer = store.get(7).await.unwrap().unwrap();
        assert_eq!(referrer.balance, 100);
        assert_eq!(referrer.earnings, 100);
        assert_eq!(referrer.referral_count, 1);
        assert_eq!(store.rewarded_referees(7).await.unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn concurrent_rewards_for_same_referee_apply_once() {
        let (_dir, store) = make_store();
        store.put(Account::new(7, None)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.reward_referrer_once(7, 42, 100).await }));
        }
        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
        assert_eq!(store.get(7).await.unwrap().unwrap().balance, 100);
    }

    #[tokio::test]
    async fn increment_refuses_negative_result() {
        let (_dir, store) = make_store();
        store.put(Account::new(1, None)).await.unwrap();
        assert!(store.increment(1, Counter::Balance, 50).await.unwrap());
        assert!(!store.increment(1, Counter::Balance, -60).await.unwrap());
        assert!(store.increment(1, Counter::Balance, -50).await.unwrap());
        assert!(!store.increment(2, Counter::Balance, 10).await.unwrap());
        assert_eq!(store.get(1).await.unwrap().unwrap().balance, 0);
    }

    #[tokio::test]
    async fn reserve_withdrawal_zeroes_balance_and_records_request() {
        let (_dir, store) = make_store();
        approved_with_balance(&store, 5, 1450).await;

        let outcome = store
            .reserve_withdrawal(5, contact(), 200, FeePolicy::default())
            .await
            .unwrap();
        let ReserveOutcome::Reserved(request) = outcome else {
            panic!("expected reservation, got {outcome:?}");
        };
        assert_eq!((request.gross, request.fee, request.net), (1450, 40, 1410));
        assert_eq!(request.status, WithdrawalStatus::Pending);

        let account = store.get(5).await.unwrap().unwrap();
        assert_eq!(account.balance, 0);
        assert!(account.pending_withdrawal);
        let pending = store.pending_withdrawals().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!((pending[0].id, pending[0].net), (request.id, 1410));

        let again = store
            .reserve_withdrawal(5, contact(), 200, FeePolicy::default())
            .await
            .unwrap();
        assert_eq!(again, ReserveOutcome::AlreadyPending);
    }

    #[tokio::test]
    async fn reserve_withdrawal_below_minimum_changes_nothing() {
        let (_dir, store) = make_store();
        approved_with_balance(&store, 5, 150).await;

        let outcome = store
            .reserve_withdrawal(5, contact(), 200, FeePolicy::default())
            .await
            .unwrap();
        assert_eq!(outcome, ReserveOutcome::BelowMinimum { balance: 150 });

        let account = store.get(5).await.unwrap().unwrap();
        assert_eq!(account.balance, 150);
        assert!(!account.pending_withdrawal);
        assert!(store.withdrawals_for(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn complete_and_decline_resolve_pending_request() {
        let (_dir, store) = make_store();
        approved_with_balance(&store, 5, 500).await;
        approved_with_balance(&store, 6, 300).await;
        store.reserve_withdrawal(5, contact(), 200, FeePolicy::default()).await.unwrap();
        store.reserve_withdrawal(6, contact(), 200, FeePolicy::default()).await.unwrap();

        let paid = store.complete_withdrawal(5).await.unwrap().unwrap();
        assert_eq!(paid.status, WithdrawalStatus::Paid);
        assert!(paid.resolved_at.is_some());
        let account = store.get(5).await.unwrap().unwrap();
        assert!(!account.pending_withdrawal);
        assert_eq!(account.balance, 0);
        assert!(store.complete_withdrawal(5).await.unwrap().is_none());

        let declined = store.decline_withdrawal(6).await.unwrap().unwrap();
        assert_eq!(declined.status, WithdrawalStatus::Declined);
        let account = store.get(6).await.unwrap().unwrap();
        assert_eq!(account.balance, 300);
        assert!(!account.pending_withdrawal);

        assert!(store.pending_withdrawals().await.unwrap().is_empty());
        assert_eq!(store.withdrawals_for(6).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn approve_reports_previous_state() {
        let (_dir, store) = make_store();
        store.put(Account::new(1, None)).await.unwrap();

        assert!(matches!(store.approve(1).await.unwrap(), ApprovalOutcome::Approved(a) if a.approved));
        assert!(matches!(store.approve(1).await.unwrap(), ApprovalOutcome::AlreadyApproved(_)));
        assert_eq!(store.approve(2).await.unwrap(), ApprovalOutcome::NotFound);
    }
}
