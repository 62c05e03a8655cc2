// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use bookhub_app::{
    AppCommand, AppEvent, AppMode, AppState, Book, BookFormInput, Category, FormKind, Loan,
    LoanDraft, LoanFormInput, Searchable, TabKind, User, UserFormInput, UserId, filter_indices,
};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Row, Table, Tabs};
use std::collections::BTreeSet;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;

/// One tab's worth of server rows. Active and returned loans arrive from
/// different endpoints, so they are distinct snapshots even though the row
/// type is the same.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabSnapshot {
    Books(Vec<Book>),
    Users(Vec<User>),
    Loans(Vec<Loan>),
    History(Vec<Loan>),
}

impl TabSnapshot {
    pub const fn tab_kind(&self) -> TabKind {
        match self {
            Self::Books(_) => TabKind::Books,
            Self::Users(_) => TabKind::Users,
            Self::Loans(_) => TabKind::Loans,
            Self::History(_) => TabKind::History,
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            Self::Books(rows) => rows.len(),
            Self::Users(rows) => rows.len(),
            Self::Loans(rows) => rows.len(),
            Self::History(rows) => rows.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    FetchCompleted {
        request_id: u64,
        outcome: Result<TabSnapshot, String>,
    },
}

/// Everything the UI needs from the outside world. The CLI crate provides
/// the HTTP-backed implementation; tests provide fakes. `spawn_fetch` runs
/// inline by default so fakes stay synchronous; the real runtime overrides
/// it with a worker thread.
pub trait AppRuntime {
    fn fetch_books(&mut self) -> Result<Vec<Book>>;
    fn fetch_users(&mut self) -> Result<Vec<User>>;
    fn fetch_active_loans(&mut self) -> Result<Vec<Loan>>;
    fn fetch_loan_history(&mut self) -> Result<Vec<Loan>>;

    fn create_book(&mut self, form: &BookFormInput) -> Result<()>;
    fn update_book(&mut self, isbn: &str, form: &BookFormInput) -> Result<()>;
    fn delete_book(&mut self, isbn: &str) -> Result<()>;

    fn create_user(&mut self, form: &UserFormInput) -> Result<()>;
    fn update_user(&mut self, id: UserId, form: &UserFormInput) -> Result<()>;
    fn delete_user(&mut self, id: UserId) -> Result<()>;

    fn create_loan(&mut self, draft: &LoanDraft) -> Result<()>;
    fn return_loan(&mut self, user_id: UserId, isbn: &str) -> Result<()>;

    fn fetch_snapshot(&mut self, tab: TabKind) -> Result<TabSnapshot> {
        match tab {
            TabKind::Books => Ok(TabSnapshot::Books(self.fetch_books()?)),
            TabKind::Users => Ok(TabSnapshot::Users(self.fetch_users()?)),
            TabKind::Loans => Ok(TabSnapshot::Loans(self.fetch_active_loans()?)),
            TabKind::History => Ok(TabSnapshot::History(self.fetch_loan_history()?)),
        }
    }

    fn spawn_fetch(
        &mut self,
        request_id: u64,
        tab: TabKind,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let outcome = match self.fetch_snapshot(tab) {
            Ok(snapshot) => Ok(snapshot),
            Err(error) => Err(error.to_string()),
        };
        tx.send(InternalEvent::FetchCompleted {
            request_id,
            outcome,
        })
        .map_err(|_| anyhow::anyhow!("fetch event channel closed"))?;
        Ok(())
    }
}

/// Cached rows plus the filtered view over them. The cache is only ever
/// replaced wholesale by a completed fetch; filtering and selection work on
/// indices into it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ListView<T: Searchable> {
    rows: Vec<T>,
    query: String,
    visible: Vec<usize>,
    cursor: usize,
}

impl<T: Searchable> Default for ListView<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            query: String::new(),
            visible: Vec::new(),
            cursor: 0,
        }
    }
}

impl<T: Searchable> ListView<T> {
    fn replace(&mut self, rows: Vec<T>) {
        self.rows = rows;
        self.refilter();
    }

    fn set_query(&mut self, query: String) {
        self.query = query;
        self.refilter();
    }

    fn refilter(&mut self) {
        self.visible = filter_indices(&self.query, &self.rows);
        self.clamp_cursor();
    }

    fn clamp_cursor(&mut self) {
        if self.visible.is_empty() {
            self.cursor = 0;
        } else {
            self.cursor = self.cursor.min(self.visible.len() - 1);
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.visible.is_empty() {
            return;
        }
        let last = self.visible.len() as isize - 1;
        let next = (self.cursor as isize + delta).clamp(0, last);
        self.cursor = next as usize;
    }

    fn selected(&self) -> Option<&T> {
        self.visible
            .get(self.cursor)
            .and_then(|&index| self.rows.get(index))
    }
}

/// Key of the row a form is editing. Books key by ISBN, users by id; the
/// key never changes while the form is open.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EditTarget {
    Book(String),
    User(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FormUiState {
    kind: FormKind,
    values: Vec<String>,
    field: usize,
    category: Category,
    available: bool,
    editing: Option<EditTarget>,
}

impl FormUiState {
    fn new(kind: FormKind) -> Self {
        Self {
            kind,
            values: vec![String::new(); 3],
            field: 0,
            category: Category::KNOWN[0].clone(),
            available: true,
            editing: None,
        }
    }

    fn field_count(&self) -> usize {
        match self.kind {
            FormKind::Book => 5,
            FormKind::User | FormKind::Loan => 3,
        }
    }
}

/// Action armed by a destructive key, executed only after `y`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfirmAction {
    DeleteBook(String),
    DeleteUser(UserId),
    ReturnLoan { user_id: UserId, isbn: String },
}

impl ConfirmAction {
    fn prompt(&self) -> String {
        match self {
            Self::DeleteBook(isbn) => format!("delete book {isbn}? y/n"),
            Self::DeleteUser(id) => format!("delete user {}? y/n", id.get()),
            Self::ReturnLoan { isbn, .. } => format!("return {isbn}? y/n"),
        }
    }
}

#[derive(Debug, Default)]
struct ViewData {
    books: ListView<Book>,
    users: ListView<User>,
    loans: ListView<Loan>,
    history: ListView<Loan>,
    form: Option<FormUiState>,
    confirm: Option<ConfirmAction>,
    in_flight: Vec<(u64, TabKind)>,
    next_request_id: u64,
    status_token: u64,
}

impl ViewData {
    fn next_request_id(&mut self) -> u64 {
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.next_request_id
    }

    fn tab_in_flight(&self, tab: TabKind) -> bool {
        self.in_flight.iter().any(|(_, pending)| *pending == tab)
    }
}

pub fn run_app<R: AppRuntime>(state: &mut AppState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();

    for tab in TabKind::ALL {
        request_fetch(state, runtime, &mut view_data, &internal_tx, tab);
    }

    let mut result = Ok(());
    loop {
        process_internal_events(state, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = event::poll(Duration::from_millis(120)).context("poll event")?;
        if has_event {
            match event::read().context("read event")? {
                Event::Key(key) => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::FetchCompleted {
                request_id,
                outcome,
            } => {
                handle_fetch_completed(state, view_data, tx, request_id, outcome);
            }
        }
    }
}

fn handle_fetch_completed(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    request_id: u64,
    outcome: Result<TabSnapshot, String>,
) {
    // A request superseded by a newer one for the same tab was already
    // forgotten; its late result is dropped here.
    let Some(position) = view_data
        .in_flight
        .iter()
        .position(|(pending_id, _)| *pending_id == request_id)
    else {
        return;
    };
    let (_, tab) = view_data.in_flight.remove(position);

    match outcome {
        Ok(snapshot) => apply_snapshot(view_data, snapshot),
        Err(message) => {
            emit_status(
                state,
                view_data,
                tx,
                format!("{} load failed: {message}", tab.label()),
            );
        }
    }
}

fn apply_snapshot(view_data: &mut ViewData, snapshot: TabSnapshot) {
    match snapshot {
        TabSnapshot::Books(rows) => view_data.books.replace(rows),
        TabSnapshot::Users(rows) => view_data.users.replace(rows),
        TabSnapshot::Loans(rows) => view_data.loans.replace(rows),
        TabSnapshot::History(rows) => view_data.history.replace(rows),
    }
}

fn request_fetch<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    tab: TabKind,
) {
    // A newer request for the same tab supersedes the older one.
    view_data.in_flight.retain(|(_, pending)| *pending != tab);

    let request_id = view_data.next_request_id();
    view_data.in_flight.push((request_id, tab));
    if let Err(error) = runtime.spawn_fetch(request_id, tab, internal_tx.clone()) {
        view_data
            .in_flight
            .retain(|(pending_id, _)| *pending_id != request_id);
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("{} load failed: {error}", tab.label()),
        );
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(4));
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.status_line = Some(message.into());
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn dispatch_and_refresh<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    command: AppCommand,
    internal_tx: &Sender<InternalEvent>,
) {
    let events = state.dispatch(command);
    if events
        .iter()
        .any(|event| matches!(event, AppEvent::TabChanged(_)))
    {
        request_fetch(state, runtime, view_data, internal_tx, state.active_tab);
    }
    if events
        .iter()
        .any(|event| matches!(event, AppEvent::StatusUpdated(_)))
    {
        view_data.status_token = view_data.status_token.saturating_add(1);
        schedule_status_clear(internal_tx, view_data.status_token);
    }
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.confirm.is_some() {
        handle_confirm_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    match state.mode {
        AppMode::Nav => handle_nav_key(state, runtime, view_data, internal_tx, key),
        AppMode::Search => handle_search_key(state, view_data, internal_tx, key),
        AppMode::Form(_) => handle_form_key(state, runtime, view_data, internal_tx, key),
    }
    false
}

fn handle_nav_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match (key.code, key.modifiers) {
        (KeyCode::Tab, _) | (KeyCode::Char('f'), KeyModifiers::NONE) => {
            dispatch_and_refresh(state, runtime, view_data, AppCommand::NextTab, internal_tx);
        }
        (KeyCode::BackTab, _) | (KeyCode::Char('b'), KeyModifiers::NONE) => {
            dispatch_and_refresh(state, runtime, view_data, AppCommand::PrevTab, internal_tx);
        }
        (KeyCode::Char('/'), KeyModifiers::NONE) => {
            state.dispatch(AppCommand::EnterSearch);
        }
        (KeyCode::Char('r'), KeyModifiers::NONE) | (KeyCode::F(5), _) => {
            request_fetch(state, runtime, view_data, internal_tx, state.active_tab);
            emit_status(state, view_data, internal_tx, "refreshing");
        }
        (KeyCode::Up, _) | (KeyCode::Char('k'), KeyModifiers::NONE) => {
            move_active_cursor(state, view_data, -1);
        }
        (KeyCode::Down, _) | (KeyCode::Char('j'), KeyModifiers::NONE) => {
            move_active_cursor(state, view_data, 1);
        }
        (KeyCode::Char('n'), KeyModifiers::NONE) => {
            open_new_form(state, view_data, internal_tx);
        }
        (KeyCode::Char('e'), KeyModifiers::NONE) => {
            open_edit_form(state, view_data, internal_tx);
        }
        (KeyCode::Char('d'), KeyModifiers::NONE) => {
            arm_delete(state, view_data, internal_tx);
        }
        (KeyCode::Char('v'), KeyModifiers::NONE) => {
            arm_return(state, view_data, internal_tx);
        }
        (KeyCode::Esc, _) => {
            state.dispatch(AppCommand::ClearStatus);
        }
        _ => {}
    }
}

fn move_active_cursor(state: &AppState, view_data: &mut ViewData, delta: isize) {
    match state.active_tab {
        TabKind::Books => view_data.books.move_cursor(delta),
        TabKind::Users => view_data.users.move_cursor(delta),
        TabKind::Loans => view_data.loans.move_cursor(delta),
        TabKind::History => view_data.history.move_cursor(delta),
    }
}

fn guard_tab_idle(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) -> bool {
    if view_data.tab_in_flight(state.active_tab) {
        emit_status(state, view_data, internal_tx, "still loading; wait");
        return false;
    }
    true
}

fn open_new_form(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if !guard_tab_idle(state, view_data, internal_tx) {
        return;
    }
    let kind = match state.active_tab {
        TabKind::Books => FormKind::Book,
        TabKind::Users => FormKind::User,
        TabKind::Loans => FormKind::Loan,
        TabKind::History => {
            emit_status(state, view_data, internal_tx, "history is read-only");
            return;
        }
    };
    view_data.form = Some(FormUiState::new(kind));
    state.dispatch(AppCommand::OpenForm(kind));
}

fn open_edit_form(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if !guard_tab_idle(state, view_data, internal_tx) {
        return;
    }
    match state.active_tab {
        TabKind::Books => {
            let Some(book) = view_data.books.selected().cloned() else {
                emit_status(state, view_data, internal_tx, "select a book first");
                return;
            };
            let mut form = FormUiState::new(FormKind::Book);
            form.values = vec![book.isbn.clone(), book.title, book.author];
            form.category = book.category;
            form.available = book.available;
            form.editing = Some(EditTarget::Book(book.isbn));
            // The key field is locked; start on the first editable one.
            form.field = 1;
            view_data.form = Some(form);
            state.dispatch(AppCommand::OpenForm(FormKind::Book));
        }
        TabKind::Users => {
            let Some(user) = view_data.users.selected().cloned() else {
                emit_status(state, view_data, internal_tx, "select a user first");
                return;
            };
            let mut form = FormUiState::new(FormKind::User);
            form.values = vec![user.name, user.email, user.phone];
            form.editing = Some(EditTarget::User(user.id));
            view_data.form = Some(form);
            state.dispatch(AppCommand::OpenForm(FormKind::User));
        }
        TabKind::Loans | TabKind::History => {
            emit_status(state, view_data, internal_tx, "loans cannot be edited");
        }
    }
}

fn arm_delete(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if !guard_tab_idle(state, view_data, internal_tx) {
        return;
    }
    match state.active_tab {
        TabKind::Books => {
            let Some(book) = view_data.books.selected() else {
                emit_status(state, view_data, internal_tx, "select a book first");
                return;
            };
            view_data.confirm = Some(ConfirmAction::DeleteBook(book.isbn.clone()));
        }
        TabKind::Users => {
            let Some(user) = view_data.users.selected() else {
                emit_status(state, view_data, internal_tx, "select a user first");
                return;
            };
            view_data.confirm = Some(ConfirmAction::DeleteUser(user.id));
        }
        TabKind::Loans | TabKind::History => {
            emit_status(state, view_data, internal_tx, "loans cannot be deleted");
        }
    }
}

fn arm_return(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if state.active_tab != TabKind::Loans {
        emit_status(state, view_data, internal_tx, "returns start from the loans tab");
        return;
    }
    if !guard_tab_idle(state, view_data, internal_tx) {
        return;
    }
    let Some(loan) = view_data.loans.selected() else {
        emit_status(state, view_data, internal_tx, "select a loan first");
        return;
    };
    if !loan.status.is_active() {
        emit_status(
            state,
            view_data,
            internal_tx,
            "only active loans can be returned",
        );
        return;
    }
    view_data.confirm = Some(ConfirmAction::ReturnLoan {
        user_id: loan.user_id,
        isbn: loan.isbn.clone(),
    });
}

fn handle_confirm_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(action) = view_data.confirm.take() else {
        return;
    };
    if key.code != KeyCode::Char('y') {
        emit_status(state, view_data, internal_tx, "canceled");
        return;
    }

    match action {
        ConfirmAction::DeleteBook(isbn) => {
            // The row may have vanished under us since the prompt opened.
            if resolve_book(&view_data.books.rows, &isbn).is_none() {
                emit_status(
                    state,
                    view_data,
                    internal_tx,
                    "book no longer listed; refresh and retry",
                );
                return;
            }
            match runtime.delete_book(&isbn) {
                Ok(()) => {
                    emit_status(state, view_data, internal_tx, format!("deleted {isbn}"));
                    request_fetch(state, runtime, view_data, internal_tx, TabKind::Books);
                }
                Err(error) => {
                    emit_status(state, view_data, internal_tx, format!("delete failed: {error}"));
                }
            }
        }
        ConfirmAction::DeleteUser(id) => {
            if resolve_user(&view_data.users.rows, id).is_none() {
                emit_status(
                    state,
                    view_data,
                    internal_tx,
                    "user no longer listed; refresh and retry",
                );
                return;
            }
            match runtime.delete_user(id) {
                Ok(()) => {
                    emit_status(
                        state,
                        view_data,
                        internal_tx,
                        format!("deleted user {}", id.get()),
                    );
                    request_fetch(state, runtime, view_data, internal_tx, TabKind::Users);
                }
                Err(error) => {
                    emit_status(state, view_data, internal_tx, format!("delete failed: {error}"));
                }
            }
        }
        ConfirmAction::ReturnLoan { user_id, isbn } => {
            if resolve_active_loan(&view_data.loans.rows, user_id, &isbn).is_none() {
                emit_status(
                    state,
                    view_data,
                    internal_tx,
                    "loan no longer listed; refresh and retry",
                );
                return;
            }
            match runtime.return_loan(user_id, &isbn) {
                Ok(()) => {
                    emit_status(state, view_data, internal_tx, format!("returned {isbn}"));
                    refresh_loan_tabs(state, runtime, view_data, internal_tx);
                }
                Err(error) => {
                    emit_status(state, view_data, internal_tx, format!("return failed: {error}"));
                }
            }
        }
    }
}

/// A loan mutation changes both the active list and the history, so both
/// are refreshed, each by its own request.
fn refresh_loan_tabs<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    request_fetch(state, runtime, view_data, internal_tx, TabKind::Loans);
    request_fetch(state, runtime, view_data, internal_tx, TabKind::History);
}

fn resolve_book<'a>(books: &'a [Book], isbn: &str) -> Option<&'a Book> {
    books.iter().find(|book| book.isbn == isbn)
}

fn resolve_user(users: &[User], id: UserId) -> Option<&User> {
    users.iter().find(|user| user.id == id)
}

fn resolve_active_loan<'a>(loans: &'a [Loan], user_id: UserId, isbn: &str) -> Option<&'a Loan> {
    loans
        .iter()
        .find(|loan| loan.user_id == user_id && loan.isbn == isbn && loan.status.is_active())
}

fn handle_search_key(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Enter => {
            state.dispatch(AppCommand::ExitToNav);
        }
        KeyCode::Esc => {
            set_active_query(state, view_data, String::new());
            state.dispatch(AppCommand::ExitToNav);
            emit_status(state, view_data, internal_tx, "filter cleared");
        }
        KeyCode::Backspace => {
            let mut query = active_query(state, view_data).to_owned();
            query.pop();
            set_active_query(state, view_data, query);
        }
        KeyCode::Char(ch) => {
            let mut query = active_query(state, view_data).to_owned();
            query.push(ch);
            set_active_query(state, view_data, query);
        }
        _ => {}
    }
}

fn active_query<'a>(state: &AppState, view_data: &'a ViewData) -> &'a str {
    match state.active_tab {
        TabKind::Books => &view_data.books.query,
        TabKind::Users => &view_data.users.query,
        TabKind::Loans => &view_data.loans.query,
        TabKind::History => &view_data.history.query,
    }
}

fn set_active_query(state: &AppState, view_data: &mut ViewData, query: String) {
    match state.active_tab {
        TabKind::Books => view_data.books.set_query(query),
        TabKind::Users => view_data.users.set_query(query),
        TabKind::Loans => view_data.loans.set_query(query),
        TabKind::History => view_data.history.set_query(query),
    }
}

const BOOK_FIELD_LABELS: [&str; 5] = ["isbn", "title", "author", "category", "available"];
const USER_FIELD_LABELS: [&str; 3] = ["name", "email", "phone"];
const LOAN_FIELD_LABELS: [&str; 3] = ["user id", "isbn", "due date (YYYY-MM-DD)"];

fn form_field_labels(kind: FormKind) -> &'static [&'static str] {
    match kind {
        FormKind::Book => &BOOK_FIELD_LABELS,
        FormKind::User => &USER_FIELD_LABELS,
        FormKind::Loan => &LOAN_FIELD_LABELS,
    }
}

fn handle_form_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(form) = view_data.form.as_mut() else {
        state.dispatch(AppCommand::ExitToNav);
        return;
    };

    match key.code {
        KeyCode::Esc => {
            view_data.form = None;
            state.dispatch(AppCommand::ExitToNav);
            emit_status(state, view_data, internal_tx, "form closed");
        }
        KeyCode::Enter => {
            submit_form(state, runtime, view_data, internal_tx);
        }
        KeyCode::Up => {
            let floor = usize::from(form.kind == FormKind::Book && form.editing.is_some());
            if form.field > floor {
                form.field -= 1;
            }
        }
        KeyCode::Down => {
            if form.field + 1 < form.field_count() {
                form.field += 1;
            }
        }
        KeyCode::Left | KeyCode::Right => {
            if form.kind == FormKind::Book && form.field == 3 {
                let delta = if key.code == KeyCode::Left { -1 } else { 1 };
                form.category = cycle_category(&form.category, delta);
            }
        }
        KeyCode::Char(' ') if form.kind == FormKind::Book && form.field == 4 => {
            form.available = !form.available;
        }
        KeyCode::Backspace => {
            if let Some(value) = form.values.get_mut(form.field) {
                value.pop();
            }
        }
        KeyCode::Char(ch) => {
            // The key field of an edited book stays untouched.
            let locked = form.kind == FormKind::Book
                && form.field == 0
                && form.editing.is_some();
            if !locked && let Some(value) = form.values.get_mut(form.field) {
                value.push(ch);
            }
        }
        _ => {}
    }
}

fn cycle_category(current: &Category, delta: isize) -> Category {
    let len = Category::KNOWN.len() as isize;
    match Category::KNOWN.iter().position(|known| known == current) {
        Some(index) => {
            let next = (index as isize + delta).rem_euclid(len) as usize;
            Category::KNOWN[next].clone()
        }
        // Legacy values have no slot in the cycle; either arrow snaps to
        // the first known category.
        None => Category::KNOWN[0].clone(),
    }
}

/// Validates locally and only then talks to the runtime; a form that fails
/// validation never causes a network call.
fn submit_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(form) = view_data.form.clone() else {
        return;
    };

    match form.kind {
        FormKind::Book => {
            let input = BookFormInput {
                isbn: form.values[0].clone(),
                title: form.values[1].clone(),
                author: form.values[2].clone(),
                category: Some(form.category.clone()),
                available: form.available,
            };
            if let Err(error) = input.validate() {
                emit_status(state, view_data, internal_tx, error.to_string());
                return;
            }
            let result = match &form.editing {
                Some(EditTarget::Book(isbn)) => runtime.update_book(isbn, &input),
                _ => {
                    let existing: BTreeSet<String> = view_data
                        .books
                        .rows
                        .iter()
                        .map(|book| book.isbn.clone())
                        .collect();
                    if let Err(error) = input.ensure_new_isbn(&existing) {
                        emit_status(state, view_data, internal_tx, error.to_string());
                        return;
                    }
                    runtime.create_book(&input)
                }
            };
            match result {
                Ok(()) => {
                    view_data.form = None;
                    state.dispatch(AppCommand::ExitToNav);
                    emit_status(state, view_data, internal_tx, "book saved");
                    request_fetch(state, runtime, view_data, internal_tx, TabKind::Books);
                }
                Err(error) => {
                    emit_status(state, view_data, internal_tx, format!("save failed: {error}"));
                }
            }
        }
        FormKind::User => {
            let input = UserFormInput {
                name: form.values[0].clone(),
                email: form.values[1].clone(),
                phone: form.values[2].clone(),
            };
            if let Err(error) = input.validate() {
                emit_status(state, view_data, internal_tx, error.to_string());
                return;
            }
            let result = match &form.editing {
                Some(EditTarget::User(id)) => runtime.update_user(*id, &input),
                _ => runtime.create_user(&input),
            };
            match result {
                Ok(()) => {
                    view_data.form = None;
                    state.dispatch(AppCommand::ExitToNav);
                    emit_status(state, view_data, internal_tx, "user saved");
                    request_fetch(state, runtime, view_data, internal_tx, TabKind::Users);
                }
                Err(error) => {
                    emit_status(state, view_data, internal_tx, format!("save failed: {error}"));
                }
            }
        }
        FormKind::Loan => {
            let input = LoanFormInput {
                user_id: form.values[0].clone(),
                isbn: form.values[1].clone(),
                due_date: form.values[2].clone(),
            };
            let draft = match input.validate(local_today()) {
                Ok(draft) => draft,
                Err(error) => {
                    emit_status(state, view_data, internal_tx, error.to_string());
                    return;
                }
            };
            match runtime.create_loan(&draft) {
                Ok(()) => {
                    view_data.form = None;
                    state.dispatch(AppCommand::ExitToNav);
                    emit_status(state, view_data, internal_tx, "loan registered");
                    refresh_loan_tabs(state, runtime, view_data, internal_tx);
                }
                Err(error) => {
                    emit_status(state, view_data, internal_tx, format!("loan failed: {error}"));
                }
            }
        }
    }
}

fn local_today() -> time::Date {
    OffsetDateTime::now_utc().date()
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(frame.area());

    let selected = TabKind::ALL
        .iter()
        .position(|tab| *tab == state.active_tab)
        .unwrap_or(0);
    let tab_titles = TabKind::ALL
        .iter()
        .map(|tab| tab_title(*tab, view_data))
        .collect::<Vec<String>>();

    let tabs = Tabs::new(tab_titles)
        .block(Block::default().title("bookhub").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout[0]);

    render_table(frame, layout[1], state, view_data);

    let status_widget = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status_widget, layout[2]);

    if let Some(form) = &view_data.form {
        let area = centered_rect(60, 52, frame.area());
        frame.render_widget(Clear, area);
        let title = form_title(form);
        let body = Paragraph::new(render_form_text(form))
            .block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(body, area);
    }
}

fn tab_title(tab: TabKind, view_data: &ViewData) -> String {
    let (visible, total) = match tab {
        TabKind::Books => (view_data.books.visible.len(), view_data.books.rows.len()),
        TabKind::Users => (view_data.users.visible.len(), view_data.users.rows.len()),
        TabKind::Loans => (view_data.loans.visible.len(), view_data.loans.rows.len()),
        TabKind::History => (
            view_data.history.visible.len(),
            view_data.history.rows.len(),
        ),
    };
    let spinner = if view_data.tab_in_flight(tab) { "*" } else { "" };
    if visible == total {
        format!("{} ({total}){spinner}", tab.label())
    } else {
        format!("{} ({visible}/{total}){spinner}", tab.label())
    }
}

fn render_table(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &AppState,
    view_data: &ViewData,
) {
    let (header, rows, cursor, query): (Vec<&str>, Vec<Vec<String>>, usize, &str) =
        match state.active_tab {
            TabKind::Books => (
                vec!["isbn", "title", "author", "category", "avail"],
                view_data
                    .books
                    .visible
                    .iter()
                    .map(|&index| {
                        let book = &view_data.books.rows[index];
                        vec![
                            book.isbn.clone(),
                            book.title.clone(),
                            book.author.clone(),
                            book.category.as_str().to_owned(),
                            if book.available { "yes" } else { "no" }.to_owned(),
                        ]
                    })
                    .collect(),
                view_data.books.cursor,
                &view_data.books.query,
            ),
            TabKind::Users => (
                vec!["id", "name", "email", "phone"],
                view_data
                    .users
                    .visible
                    .iter()
                    .map(|&index| {
                        let user = &view_data.users.rows[index];
                        vec![
                            user.id.get().to_string(),
                            user.name.clone(),
                            user.email.clone(),
                            user.phone.clone(),
                        ]
                    })
                    .collect(),
                view_data.users.cursor,
                &view_data.users.query,
            ),
            TabKind::Loans => loan_table(&view_data.loans),
            TabKind::History => loan_table(&view_data.history),
        };

    let title = if query.is_empty() {
        state.active_tab.label().to_owned()
    } else {
        format!("{} | filter: {query}", state.active_tab.label())
    };

    let widths = vec![Constraint::Ratio(1, header.len() as u32); header.len()];
    let table = Table::new(
        rows.into_iter().enumerate().map(|(position, cells)| {
            let row = Row::new(cells);
            if position == cursor {
                row.style(
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                )
            } else {
                row
            }
        }),
        widths,
    )
    .header(Row::new(header).style(Style::default().add_modifier(Modifier::UNDERLINED)))
    .block(Block::default().title(title).borders(Borders::ALL));

    frame.render_widget(table, area);
}

fn loan_table(view: &ListView<Loan>) -> (Vec<&'static str>, Vec<Vec<String>>, usize, &str) {
    (
        vec!["id", "user", "isbn", "loaned", "due", "status"],
        view.visible
            .iter()
            .map(|&index| {
                let loan = &view.rows[index];
                vec![
                    loan.id.get().to_string(),
                    loan.user_id.get().to_string(),
                    loan.isbn.clone(),
                    loan.loan_date.to_string(),
                    loan.due_date.to_string(),
                    loan.status.as_str().to_owned(),
                ]
            })
            .collect(),
        view.cursor,
        &view.query,
    )
}

fn form_title(form: &FormUiState) -> String {
    let noun = match form.kind {
        FormKind::Book => "book",
        FormKind::User => "user",
        FormKind::Loan => "loan",
    };
    if form.editing.is_some() {
        format!("edit {noun}")
    } else {
        format!("new {noun}")
    }
}

fn render_form_text(form: &FormUiState) -> String {
    let labels = form_field_labels(form.kind);
    let mut lines = Vec::with_capacity(labels.len() + 2);
    for (index, label) in labels.iter().enumerate() {
        let marker = if index == form.field { ">" } else { " " };
        let value = match (form.kind, index) {
            (FormKind::Book, 3) => form.category.as_str().to_owned(),
            (FormKind::Book, 4) => if form.available { "yes" } else { "no" }.to_owned(),
            _ => form.values.get(index).cloned().unwrap_or_default(),
        };
        lines.push(format!("{marker} {label}: {value}"));
    }
    lines.push(String::new());
    lines.push("enter save | esc cancel | arrows move".to_owned());
    lines.join("\n")
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if let Some(action) = &view_data.confirm {
        return action.prompt();
    }
    if let Some(line) = &state.status_line {
        return line.clone();
    }
    match state.mode {
        AppMode::Nav => {
            "tab/f/b tabs | / search | r refresh | n new | e edit | d delete | v return | ctrl-q quit"
                .to_owned()
        }
        AppMode::Search => "type to filter | enter keep | esc clear".to_owned(),
        AppMode::Form(_) => "enter save | esc cancel".to_owned(),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
