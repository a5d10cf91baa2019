//! Marks "the main thread" for the handful of operations §5 restricts to
//! it (`AssetDefinition::import`, `Resource::query`, pool relocation).
//!
//! There's no portable way to ask the OS "is this the main thread"; the
//! engine instead has the embedder call [`mark_current_thread_as_main`]
//! once during `AssetSystem::init()`, and every affinity-sensitive entry
//! point calls [`assert_main_thread`], which is a debug-only check — the
//! same spirit as the source's `ionassert(Platform::IsMainThread())`.

use std::cell::Cell;

thread_local! {
    static IS_MAIN_THREAD: Cell<bool> = const { Cell::new(false) };
}

pub fn mark_current_thread_as_main() {
    IS_MAIN_THREAD.with(|flag| flag.set(true));
}

pub fn is_main_thread() -> bool {
    IS_MAIN_THREAD.with(|flag| flag.get())
}

#[track_caller]
pub fn assert_main_thread() {
    debug_assert!(
        is_main_thread(),
        "called from a non-main thread; this operation requires main-thread affinity"
    );
}
