use crate::components::ui::{
    Alert, AlertDescription, AlertTitle, Button, ButtonSize, ButtonVariant, Card, CardContent,
    CardHeader, CardTitle, Input, Spinner, Textarea, Toast,
};
use crate::models::{format_timestamp, NotePatch};
use crate::state::{AppContext, NotesController, Phase, SyncState};
use crate::util::is_local_id;
use icons::X;
use leptos::ev;
use leptos::prelude::*;
use leptos_dom::helpers::window_event_listener;

fn controller() -> NotesController {
    expect_context::<AppContext>().0.notes
}

#[component]
pub fn NotesPage() -> impl IntoView {
    let app_state = expect_context::<AppContext>();
    let notes = app_state.0.notes.clone();
    let api_url = app_state.0.config.api_url.clone();
    let state = notes.state();
    let phase = Memo::new(move |_| state.with(|s| s.phase));

    // Re-probe as soon as the browser reports connectivity again.
    let online = {
        let notes = notes.clone();
        window_event_listener(ev::online, move |_ev: web_sys::Event| {
            if notes.snapshot().is_offline_mode {
                log::info!("event=online module=pages status=reprobe");
                notes.retry();
            }
        })
    };
    let escape = window_event_listener(ev::keydown, move |ev: web_sys::KeyboardEvent| {
        if ev.key() == "Escape" {
            notes.dismiss_notice();
        }
    });
    on_cleanup(move || {
        online.remove();
        escape.remove();
    });

    view! {
        <main class="mx-auto flex min-h-screen max-w-5xl flex-col gap-4 px-4 py-6">
            <header class="flex items-baseline justify-between gap-2">
                <h1 class="text-xl font-semibold">"Notes"</h1>
                <span class="truncate text-xs text-muted-foreground">{api_url}</span>
            </header>

            {move || match phase.get() {
                Phase::Loading => view! { <LoadingState /> }.into_any(),
                Phase::Error => view! { <ErrorState /> }.into_any(),
                Phase::Ready => view! { <Workspace /> }.into_any(),
            }}

            <NoticeToast />
        </main>
    }
}

#[component]
fn LoadingState() -> impl IntoView {
    view! {
        <div class="flex items-center gap-2 px-1 py-8 text-sm text-muted-foreground">
            <Spinner />
            <span>"Loading notes…"</span>
        </div>
    }
}

#[component]
fn ErrorState() -> impl IntoView {
    let notes = controller();
    let state = notes.state();
    let on_retry = Callback::new(move |_: ()| notes.retry());

    view! {
        <Alert class="flex-col border-destructive/30">
            <AlertTitle class="text-destructive">"Could not load notes"</AlertTitle>
            <AlertDescription class="text-destructive text-xs">
                {move || state.with(|s| s.error_message.clone().unwrap_or_default())}
            </AlertDescription>
            <Button size=ButtonSize::Sm variant=ButtonVariant::Outline on:click=move |_| on_retry.run(())>
                "Retry"
            </Button>
        </Alert>
    }
}

#[component]
fn Workspace() -> impl IntoView {
    view! {
        <OfflineBanner />
        <div class="flex flex-col gap-4 md:flex-row md:items-start">
            <NoteList />
            <EditorFields />
        </div>
    }
}

#[component]
fn OfflineBanner() -> impl IntoView {
    let notes = controller();
    let state = notes.state();
    let on_reconnect = Callback::new(move |_: ()| notes.retry());

    view! {
        <Show when=move || state.with(|s| s.is_offline_mode) fallback=|| ().into_view()>
            <Alert class="items-center border-amber-500/40 bg-amber-500/10">
                <AlertDescription class="flex-1 text-xs">
                    "Local mode: the backend is unreachable. Changes are kept in memory only."
                </AlertDescription>
                <Button size=ButtonSize::Sm variant=ButtonVariant::Outline on:click=move |_| on_reconnect.run(())>
                    "Reconnect"
                </Button>
            </Alert>
        </Show>
    }
}

#[component]
fn NoteList() -> impl IntoView {
    let notes = controller();
    let state = notes.state();
    let on_select = {
        let notes = notes.clone();
        Callback::new(move |id: String| notes.select_note(&id))
    };
    let on_create = Callback::new(move |_: ()| {
        notes.create_note();
    });

    view! {
        <Card class="shrink-0 md:w-72">
            <CardHeader>
                <CardTitle class="text-sm">"All notes"</CardTitle>
                <Button size=ButtonSize::Sm on:click=move |_| on_create.run(())>"New note"</Button>
            </CardHeader>
            <CardContent>
                <Show
                    when=move || state.with(|s| !s.notes.is_empty())
                    fallback=|| view! { <div class="text-sm text-muted-foreground">"No notes yet."</div> }
                >
                    <ul class="space-y-1">
                        {move || {
                            let selected = state.with(|s| s.selected_id.clone());
                            state
                                .with(SyncState::sorted_notes)
                                .into_iter()
                                .map(|note| {
                                    let is_selected = selected.as_deref() == Some(note.id.as_str());
                                    let class = if is_selected {
                                        "block w-full rounded-md border border-border bg-accent px-3 py-2 text-left"
                                    } else {
                                        "block w-full rounded-md border border-transparent px-3 py-2 text-left transition-colors hover:bg-accent/50"
                                    };
                                    let local = is_local_id(&note.id);
                                    let id = note.id.clone();

                                    view! {
                                        <li>
                                            <button
                                                type="button"
                                                class=class
                                                aria-current=is_selected.then_some("true")
                                                on:click=move |_| on_select.run(id.clone())
                                            >
                                                <div class="truncate text-sm font-medium">{note.display_title()}</div>
                                                <div class="flex gap-1 text-xs text-muted-foreground">
                                                    <span>{format_timestamp(note.updated_at)}</span>
                                                    {local.then(|| view! { <span>"· local"</span> })}
                                                </div>
                                            </button>
                                        </li>
                                    }
                                })
                                .collect_view()
                        }}
                    </ul>
                </Show>
            </CardContent>
        </Card>
    }
}

#[component]
fn EditorFields() -> impl IntoView {
    let notes = controller();
    let state = notes.state();
    let selected = Memo::new(move |_| state.with(|s| s.selected_note().cloned()));
    let selected_id = move || selected.with_untracked(|n| n.as_ref().map(|n| n.id.clone()));

    let title = Signal::derive(move || {
        selected.with(|n| n.as_ref().map(|n| n.title.clone()).unwrap_or_default())
    });
    let content = Signal::derive(move || {
        selected.with(|n| n.as_ref().map(|n| n.content.clone()).unwrap_or_default())
    });
    let updated = move || {
        selected.with(|n| n.as_ref().map(|n| format_timestamp(n.updated_at)).unwrap_or_default())
    };

    let on_title = {
        let notes = notes.clone();
        Callback::new(move |v: String| {
            if let Some(id) = selected_id() {
                notes.update_note(&id, NotePatch::title(v));
            }
        })
    };
    let on_content = {
        let notes = notes.clone();
        Callback::new(move |v: String| {
            if let Some(id) = selected_id() {
                notes.update_note(&id, NotePatch::content(v));
            }
        })
    };
    let on_delete = Callback::new(move |_: ()| {
        if let Some(id) = selected_id() {
            notes.delete_note(&id);
        }
    });

    view! {
        <Card class="min-w-0 flex-1">
            <Show
                when=move || selected.with(Option::is_some)
                fallback=|| view! {
                    <CardContent>
                        <div class="text-sm text-muted-foreground">"Select a note or create a new one."</div>
                    </CardContent>
                }
            >
                <CardHeader>
                    <span class="text-xs text-muted-foreground">{updated}</span>
                    <Button size=ButtonSize::Sm variant=ButtonVariant::Destructive on:click=move |_| on_delete.run(())>
                        "Delete"
                    </Button>
                </CardHeader>
                <CardContent class="space-y-3">
                    <Input
                        id="note-title"
                        class="h-10 text-lg font-semibold"
                        placeholder="Title"
                        value=title
                        on_input=on_title
                    />
                    <Textarea
                        id="note-content"
                        placeholder="Write something…"
                        value=content
                        on_input=on_content
                    />
                </CardContent>
            </Show>
        </Card>
    }
}

#[component]
fn NoticeToast() -> impl IntoView {
    let notes = controller();
    let state = notes.state();
    let on_dismiss = Callback::new(move |_: ()| notes.dismiss_notice());

    view! {
        {move || {
            state
                .with(|s| s.notice.clone())
                .map(|notice| {
                    view! {
                        <Toast attr:role="status">
                            <span class="flex-1">{notice.message}</span>
                            <button
                                type="button"
                                class="rounded-sm p-1 opacity-70 hover:opacity-100"
                                aria-label="Dismiss"
                                on:click=move |_| on_dismiss.run(())
                            >
                                <X class="size-4" />
                            </button>
                        </Toast>
                    }
                })
        }}
    }
}
