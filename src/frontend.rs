use crate::actions::DONATION_PRESETS_SOL;
use crate::effect::{EffectConfig, EffectSnapshot};
use crate::effect_dom::EffectContext;
use crate::regards::{
    relative_timestamp, round_sol, truncate_address, NftTemplate, Regard, RegardStats, UserProfile,
};
use gloo_net::http::Request;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use wasm_bindgen_futures::spawn_local;
use web_sys::{
    window, HtmlElement, HtmlInputElement, HtmlSelectElement, HtmlTextAreaElement, MouseEvent,
    Storage,
};
use yew::prelude::*;

const TOKEN_KEY: &str = "dropregards-token";
const WALLET_KEY: &str = "dropregards-wallet";
const NAVBAR_REVEAL_SCROLL_PX: f64 = 480.0;

// Well-known 32-byte program address reused as the demo wallet; the stub
// auth flow accepts any valid base58 key.
const DEMO_WALLET: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr";

#[derive(Clone, Copy, PartialEq, Eq)]
enum View {
    Home,
    Send,
    Dashboard,
}

#[derive(Clone, PartialEq)]
struct WalletSession {
    token: String,
    wallet: String,
}

// ---------- storage ----------

fn local_storage() -> Option<Storage> {
    window()?.local_storage().ok().flatten()
}

fn read_stored_session() -> Option<WalletSession> {
    let storage = local_storage()?;
    let token = storage.get_item(TOKEN_KEY).ok().flatten()?;
    let wallet = storage.get_item(WALLET_KEY).ok().flatten()?;
    Some(WalletSession { token, wallet })
}

fn persist_session(session: &WalletSession) {
    if let Some(storage) = local_storage() {
        let _ = storage.set_item(TOKEN_KEY, &session.token);
        let _ = storage.set_item(WALLET_KEY, &session.wallet);
    }
}

fn clear_session() {
    if let Some(storage) = local_storage() {
        let _ = storage.remove_item(TOKEN_KEY);
        let _ = storage.remove_item(WALLET_KEY);
    }
}

// ---------- api ----------

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegardsPage {
    regards: Vec<Regard>,
    total: usize,
}

#[derive(Clone, Deserialize)]
struct NonceResponse {
    nonce: String,
}

#[derive(Clone, Deserialize)]
struct VerifyResponse {
    token: String,
}

#[derive(Clone, Deserialize)]
struct TemplatesResponse {
    templates: Vec<NftTemplate>,
}

#[derive(Clone, Deserialize)]
struct LogoutResponse {
    #[allow(dead_code)]
    success: bool,
}

#[derive(Serialize)]
struct EmptyBody {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NonceBody<'a> {
    wallet_address: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyBody<'a> {
    wallet_address: &'a str,
    signature: String,
    nonce: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRegardBody {
    recipient_username: String,
    amount: f64,
    message: String,
    transaction_signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    nft_template: Option<String>,
}

async fn fetch_json<T: DeserializeOwned>(path: &str) -> Option<T> {
    let response = Request::get(path).send().await.ok()?;
    if !response.ok() {
        return None;
    }
    response.json::<T>().await.ok()
}

async fn post_json<B: Serialize, T: DeserializeOwned>(
    path: &str,
    token: Option<&str>,
    body: &B,
) -> Option<T> {
    let mut builder = Request::post(path);
    if let Some(token) = token {
        builder = builder.header("Authorization", &format!("Bearer {token}"));
    }

    let response = builder.json(body).ok()?.send().await.ok()?;
    if !response.ok() {
        return None;
    }
    response.json::<T>().await.ok()
}

fn now_secs() -> u64 {
    (js_sys::Date::now() / 1_000.0) as u64
}

// ---------- glow sections ----------

#[derive(Clone, PartialEq, Default)]
struct SectionActivity {
    active: bool,
    leaving: bool,
    scrolling: bool,
}

impl SectionActivity {
    fn from_snapshot(snapshot: &EffectSnapshot, id: &str) -> Self {
        let active = snapshot.current.as_deref() == Some(id);
        Self {
            active,
            leaving: !active && snapshot.previous.as_deref() == Some(id),
            scrolling: snapshot.is_scrolling(),
        }
    }
}

#[derive(Properties, PartialEq)]
struct GlowSectionProps {
    id: AttrValue,
    #[prop_or_default]
    class: Classes,
    children: Children,
}

/// A section competing for the shared glow. Hovering claims it, leaving
/// releases it with a linger, and the overlay div receives the smoothed
/// `--glow-x`/`--glow-y` position from the frame loop.
#[function_component(GlowSection)]
fn glow_section(props: &GlowSectionProps) -> Html {
    let effects = use_context::<EffectContext>().expect("GlowSection needs an EffectContext");
    let node_ref = use_node_ref();
    let activity = use_state(SectionActivity::default);

    {
        let effects = effects.clone();
        let node_ref = node_ref.clone();
        let id = props.id.clone();
        use_effect_with(props.id.clone(), move |_| {
            if let Some(element) = node_ref.cast::<HtmlElement>() {
                effects.register_section(&id, element);
            }

            move || effects.unregister_section(&id)
        });
    }

    {
        let effects = effects.clone();
        let activity = activity.clone();
        let id = props.id.clone();
        use_effect_with(props.id.clone(), move |_| {
            let mut last = SectionActivity::default();
            let subscription = effects.subscribe(move |snapshot| {
                let next = SectionActivity::from_snapshot(snapshot, &id);
                if next != last {
                    last = next.clone();
                    activity.set(next);
                }
            });

            move || effects.unsubscribe(subscription)
        });
    }

    let onmouseenter = {
        let effects = effects.clone();
        let id = props.id.clone();
        Callback::from(move |_: MouseEvent| {
            effects.claim(&id);
        })
    };

    let onmouseleave = {
        let effects = effects.clone();
        let id = props.id.clone();
        Callback::from(move |_: MouseEvent| {
            effects.release(&id);
        })
    };

    html! {
        <section
            ref={node_ref}
            id={props.id.clone()}
            class={classes!(
                "glow-section",
                props.class.clone(),
                activity.active.then_some("is-active"),
                activity.leaving.then_some("is-leaving"),
                activity.scrolling.then_some("is-scrolling"),
            )}
            onmouseenter={onmouseenter}
            onmouseleave={onmouseleave}
        >
            <div class="section-glow" aria-hidden="true"></div>
            { for props.children.iter() }
        </section>
    }
}

// ---------- floating navbar ----------

#[derive(Clone, PartialEq, Default)]
struct NavbarState {
    visible: bool,
    scrolling: bool,
    current: Option<String>,
}

#[derive(Properties, PartialEq)]
struct FloatingNavbarProps {
    sections: Vec<(AttrValue, AttrValue)>,
}

/// Anchor navigation that fades in after the hero scrolls away, highlights
/// the section currently holding the glow, and dims while scrolling.
#[function_component(FloatingNavbar)]
fn floating_navbar(props: &FloatingNavbarProps) -> Html {
    let effects = use_context::<EffectContext>().expect("FloatingNavbar needs an EffectContext");
    let state = use_state(NavbarState::default);

    {
        let effects = effects.clone();
        let state = state.clone();
        use_effect_with((), move |_| {
            let mut last = NavbarState::default();
            let subscription = effects.subscribe(move |snapshot| {
                let scroll_y = window().and_then(|w| w.scroll_y().ok()).unwrap_or(0.0);
                let next = NavbarState {
                    visible: scroll_y > NAVBAR_REVEAL_SCROLL_PX,
                    scrolling: snapshot.is_scrolling(),
                    current: snapshot.current.clone(),
                };
                if next != last {
                    last = next.clone();
                    state.set(next);
                }
            });

            move || effects.unsubscribe(subscription)
        });
    }

    html! {
        <nav
            class={classes!(
                "floating-navbar",
                state.visible.then_some("is-visible"),
                state.scrolling.then_some("is-scrolling"),
            )}
            aria-label="Section navigation"
        >
            { for props.sections.iter().map(|(id, label)| {
                let highlighted = state.current.as_deref() == Some(id.as_str());
                html! {
                    <a
                        class={classes!("navbar-link", highlighted.then_some("is-current"))}
                        href={format!("#{id}")}
                    >
                        { label.clone() }
                    </a>
                }
            }) }
        </nav>
    }
}

// ---------- landing ----------

#[function_component(HomeView)]
fn home_view() -> Html {
    let sections = vec![
        (AttrValue::from("hero"), AttrValue::from("Top")),
        (AttrValue::from("features"), AttrValue::from("Features")),
        (AttrValue::from("how-it-works"), AttrValue::from("How it works")),
        (AttrValue::from("testimonials"), AttrValue::from("Testimonials")),
        (AttrValue::from("cta"), AttrValue::from("Get started")),
    ];

    html! {
        <>
            <FloatingNavbar sections={sections} />

            <GlowSection id="hero" class={classes!("hero", "glow-large")}>
                <h1>{"Send SOL with your regards"}</h1>
                <p class="lede">
                    {"DropRegards turns a Solana tip into a keepsake: a message, \
                      an optional NFT, and a dashboard your recipient will actually revisit."}
                </p>
                <a class="button-primary" href="#cta">{"Claim your page"}</a>
            </GlowSection>

            <GlowSection id="features" class={classes!("features")}>
                <h2>{"Features"}</h2>
                <ul class="feature-grid">
                    <li>
                        <h3>{"One link, any wallet"}</h3>
                        <p>{"Your profile doubles as a Solana Action, so tips work straight from a feed."}</p>
                    </li>
                    <li>
                        <h3>{"Words attached"}</h3>
                        <p>{"Every drop carries a message. The SOL is the gesture; the note is the point."}</p>
                    </li>
                    <li>
                        <h3>{"Mintable keepsakes"}</h3>
                        <p>{"Pick a template and the regard arrives with a commemorative NFT."}</p>
                    </li>
                </ul>
            </GlowSection>

            <GlowSection id="how-it-works" class={classes!("how-it-works")}>
                <h2>{"How it works"}</h2>
                <ol class="steps">
                    <li>{"Claim a username and connect your wallet."}</li>
                    <li>{"Share your DropRegards link anywhere."}</li>
                    <li>{"Friends send SOL with a note; you watch the dashboard fill up."}</li>
                </ol>
            </GlowSection>

            <GlowSection id="testimonials" class={classes!("testimonials")}>
                <h2>{"What people say"}</h2>
                <blockquote>
                    <p>{"\u{201c}The first tip I ever got came with a note that made my week.\u{201d}"}</p>
                    <footer>{"@alice"}</footer>
                </blockquote>
                <blockquote>
                    <p>{"\u{201c}Finally a tipping link that doesn't feel like an invoice.\u{201d}"}</p>
                    <footer>{"@bob"}</footer>
                </blockquote>
            </GlowSection>

            <GlowSection id="cta" class={classes!("cta")}>
                <h2>{"Ready to collect some regards?"}</h2>
                <p>{"Connect a wallet, pick a username, and share your link."}</p>
            </GlowSection>
        </>
    }
}

// ---------- send ----------

#[derive(Clone, PartialEq)]
enum SendStatus {
    Idle,
    Sending,
    Sent(Regard),
    Failed,
}

#[derive(Properties, PartialEq)]
struct SendViewProps {
    session: Option<WalletSession>,
}

#[function_component(SendView)]
fn send_view(props: &SendViewProps) -> Html {
    let recipient = use_state(|| "alice".to_string());
    let amount = use_state(|| DONATION_PRESETS_SOL[0].to_string());
    let message = use_state(String::new);
    let template = use_state(|| None::<String>);
    let templates = use_state(Vec::<NftTemplate>::new);
    let status = use_state(|| SendStatus::Idle);

    {
        let templates = templates.clone();
        use_effect_with((), move |_| {
            spawn_local(async move {
                if let Some(response) = fetch_json::<TemplatesResponse>("/api/nft/templates").await {
                    templates.set(response.templates);
                }
            });
            || ()
        });
    }

    let on_recipient = {
        let recipient = recipient.clone();
        Callback::from(move |event: InputEvent| {
            let input: HtmlInputElement = event.target_unchecked_into();
            recipient.set(input.value());
        })
    };

    let on_amount = {
        let amount = amount.clone();
        Callback::from(move |event: InputEvent| {
            let input: HtmlInputElement = event.target_unchecked_into();
            amount.set(input.value());
        })
    };

    let on_message = {
        let message = message.clone();
        Callback::from(move |event: InputEvent| {
            let input: HtmlTextAreaElement = event.target_unchecked_into();
            message.set(input.value());
        })
    };

    let on_template = {
        let template = template.clone();
        Callback::from(move |event: Event| {
            let select: HtmlSelectElement = event.target_unchecked_into();
            let value = select.value();
            template.set((!value.is_empty()).then_some(value));
        })
    };

    let on_submit = {
        let recipient = recipient.clone();
        let amount = amount.clone();
        let message = message.clone();
        let template = template.clone();
        let status = status.clone();
        let session = props.session.clone();
        Callback::from(move |event: SubmitEvent| {
            event.prevent_default();

            let Some(session) = session.clone() else {
                status.set(SendStatus::Failed);
                return;
            };
            let Ok(parsed_amount) = amount.trim().parse::<f64>() else {
                status.set(SendStatus::Failed);
                return;
            };

            let body = SendRegardBody {
                recipient_username: recipient.trim().to_string(),
                amount: parsed_amount,
                message: (*message).clone(),
                transaction_signature: format!("demo-signature-{}", js_sys::Date::now() as u64),
                nft_template: (*template).clone(),
            };

            let status = status.clone();
            status.set(SendStatus::Sending);
            spawn_local(async move {
                match post_json::<_, Regard>("/api/regards/send", Some(&session.token), &body).await {
                    Some(stored) => status.set(SendStatus::Sent(stored)),
                    None => {
                        log::warn!("sending a regard failed");
                        status.set(SendStatus::Failed);
                    }
                }
            });
        })
    };

    let preset_buttons = DONATION_PRESETS_SOL.iter().map(|preset| {
        let value = preset.to_string();
        let selected = *amount == value;
        let onclick = {
            let amount = amount.clone();
            let value = value.clone();
            Callback::from(move |_: MouseEvent| amount.set(value.clone()))
        };
        html! {
            <button
                type="button"
                class={classes!("preset", selected.then_some("is-selected"))}
                onclick={onclick}
            >
                { format!("{preset} SOL") }
            </button>
        }
    });

    html! {
        <div class="send-view">
            <h2>{"Send a regard"}</h2>
            if props.session.is_none() {
                <p class="notice">{"Connect a wallet first to send a regard."}</p>
            }
            <form onsubmit={on_submit}>
                <label>
                    {"Recipient username"}
                    <input type="text" value={(*recipient).clone()} oninput={on_recipient} />
                </label>

                <div class="amount-row">
                    { for preset_buttons }
                    <label>
                        {"Custom amount (SOL)"}
                        <input type="text" value={(*amount).clone()} oninput={on_amount} />
                    </label>
                </div>

                <label>
                    {"Message"}
                    <textarea value={(*message).clone()} oninput={on_message} />
                </label>

                <label>
                    {"Keepsake NFT"}
                    <select onchange={on_template}>
                        <option value="" selected={template.is_none()}>{"None"}</option>
                        { for templates.iter().map(|entry| {
                            let selected = template.as_deref() == Some(entry.id.as_str());
                            html! {
                                <option value={entry.id.clone()} selected={selected}>
                                    { entry.name.clone() }
                                </option>
                            }
                        }) }
                    </select>
                </label>

                <button type="submit" disabled={*status == SendStatus::Sending || props.session.is_none()}>
                    {"Send with regards"}
                </button>
            </form>

            { match &*status {
                SendStatus::Idle => html! {},
                SendStatus::Sending => html! { <p class="status">{"Sending…"}</p> },
                SendStatus::Sent(regard) => html! {
                    <p class="status is-success">
                        { format!(
                            "Sent {} SOL to {} with your regards.",
                            round_sol(regard.amount),
                            regard.recipient_username,
                        ) }
                    </p>
                },
                SendStatus::Failed => html! {
                    <p class="status is-error">{"That didn't go through. Check the fields and try again."}</p>
                },
            } }
        </div>
    }
}

// ---------- dashboard ----------

#[function_component(DashboardView)]
fn dashboard_view() -> Html {
    let username = use_state(|| "alice".to_string());
    let profile = use_state(|| None::<UserProfile>);
    let stats = use_state(|| None::<RegardStats>);
    let regards = use_state(Vec::<Regard>::new);
    let total = use_state(|| 0usize);

    {
        let key = (*username).clone();
        let profile = profile.clone();
        let stats = stats.clone();
        let regards = regards.clone();
        let total = total.clone();
        use_effect_with(key.clone(), move |_| {
            spawn_local(async move {
                profile.set(fetch_json::<UserProfile>(&format!("/api/users/{key}")).await);
                stats.set(fetch_json::<RegardStats>(&format!("/api/regards/{key}/stats")).await);
                if let Some(page) =
                    fetch_json::<RegardsPage>(&format!("/api/regards/{key}?limit=10")).await
                {
                    total.set(page.total);
                    regards.set(page.regards);
                } else {
                    total.set(0);
                    regards.set(Vec::new());
                }
            });
            || ()
        });
    }

    let on_username = {
        let username = username.clone();
        Callback::from(move |event: Event| {
            let input: HtmlInputElement = event.target_unchecked_into();
            let value = input.value().trim().to_string();
            if !value.is_empty() {
                username.set(value);
            }
        })
    };

    let now = now_secs();

    html! {
        <div class="dashboard-view">
            <label class="dashboard-picker">
                {"Dashboard for"}
                <input type="text" value={(*username).clone()} onchange={on_username} />
            </label>

            { match &*profile {
                Some(profile) => html! {
                    <header class="profile-header">
                        <img class="avatar" src={profile.profile_image.clone()} alt="" />
                        <div>
                            <h2>{ profile.display_name.clone() }</h2>
                            <p class="muted">
                                { format!(
                                    "@{} · {}",
                                    profile.username,
                                    truncate_address(&profile.wallet_address),
                                ) }
                            </p>
                            if let Some(bio) = profile.bio.clone() {
                                <p class="bio">{ bio }</p>
                            }
                        </div>
                    </header>
                },
                None => html! { <p class="notice">{"No profile with that username."}</p> },
            } }

            if let Some(stats) = &*stats {
                <ul class="stats-tiles">
                    <li><strong>{ round_sol(stats.total_sol) }</strong><span>{"SOL received"}</span></li>
                    <li><strong>{ stats.total_regards }</strong><span>{"regards"}</span></li>
                    <li><strong>{ stats.total_nfts }</strong><span>{"NFTs"}</span></li>
                    <li><strong>{ stats.unique_senders }</strong><span>{"unique senders"}</span></li>
                </ul>
            }

            <section class="regards-list">
                <h3>{ format!("Latest regards ({})", *total) }</h3>
                { if regards.is_empty() {
                    html! { <p class="muted">{"Nothing here yet. Share your link!"}</p> }
                } else {
                    html! {
                        <ul>
                            { for regards.iter().map(|regard| html! {
                                <li class="regard-card">
                                    <div class="regard-meta">
                                        <strong>{ regard.sender.clone() }</strong>
                                        <span class="muted">{ relative_timestamp(now, regard.timestamp) }</span>
                                        <span class="amount">{ format!("{} SOL", round_sol(regard.amount)) }</span>
                                    </div>
                                    <p>{ regard.message.clone() }</p>
                                    if let Some(nft) = regard.nft.clone() {
                                        <span class="nft-badge">
                                            <img src={nft.image} alt="" />
                                            { nft.name }
                                        </span>
                                    }
                                </li>
                            }) }
                        </ul>
                    }
                } }
            </section>
        </div>
    }
}

// ---------- wallet ----------

#[derive(Properties, PartialEq)]
struct WalletButtonProps {
    session: Option<WalletSession>,
    on_change: Callback<Option<WalletSession>>,
}

/// Stubbed wallet connect: requests a nonce for the demo wallet, "signs" it
/// with a placeholder signature, and stores the issued session token.
#[function_component(WalletButton)]
fn wallet_button(props: &WalletButtonProps) -> Html {
    let busy = use_state(|| false);

    let on_connect = {
        let on_change = props.on_change.clone();
        let busy = busy.clone();
        Callback::from(move |_: MouseEvent| {
            if *busy {
                return;
            }
            busy.set(true);

            let on_change = on_change.clone();
            let busy = busy.clone();
            spawn_local(async move {
                let session = connect_demo_wallet().await;
                if let Some(session) = session.as_ref() {
                    persist_session(session);
                } else {
                    log::warn!("demo wallet connect failed");
                }
                on_change.emit(session);
                busy.set(false);
            });
        })
    };

    let on_disconnect = {
        let session = props.session.clone();
        let on_change = props.on_change.clone();
        Callback::from(move |_: MouseEvent| {
            let token = session.as_ref().map(|session| session.token.clone());
            clear_session();
            on_change.emit(None);

            if let Some(token) = token {
                spawn_local(async move {
                    let _ = post_json::<_, LogoutResponse>(
                        "/api/auth/logout",
                        Some(&token),
                        &EmptyBody {},
                    )
                    .await;
                });
            }
        })
    };

    match &props.session {
        Some(session) => html! {
            <div class="wallet-chip">
                <span class="wallet-address">{ truncate_address(&session.wallet) }</span>
                <button type="button" class="wallet-disconnect" onclick={on_disconnect}>
                    {"Disconnect"}
                </button>
            </div>
        },
        None => html! {
            <button type="button" class="wallet-connect" onclick={on_connect} disabled={*busy}>
                { if *busy { "Connecting…" } else { "Connect Wallet" } }
            </button>
        },
    }
}

async fn connect_demo_wallet() -> Option<WalletSession> {
    let nonce: NonceResponse = post_json(
        "/api/auth/nonce",
        None,
        &NonceBody {
            wallet_address: DEMO_WALLET,
        },
    )
    .await?;

    let verified: VerifyResponse = post_json(
        "/api/auth/verify",
        None,
        &VerifyBody {
            wallet_address: DEMO_WALLET,
            signature: format!("demo-signature-{}", js_sys::Date::now() as u64),
            nonce: &nonce.nonce,
        },
    )
    .await?;

    Some(WalletSession {
        token: verified.token,
        wallet: DEMO_WALLET.to_string(),
    })
}

// ---------- app ----------

#[function_component(App)]
fn app() -> Html {
    let view = use_state(|| View::Home);
    let session = use_state(read_stored_session);
    let effects = use_memo((), |_| EffectContext::mount(EffectConfig::default()));

    let on_session_change = {
        let session = session.clone();
        Callback::from(move |next: Option<WalletSession>| session.set(next))
    };

    let nav_button = |target: View, label: &'static str| {
        let view = view.clone();
        let current = *view == target;
        let onclick = Callback::from(move |_: MouseEvent| view.set(target));
        html! {
            <button
                type="button"
                class={classes!("nav-button", current.then_some("is-current"))}
                onclick={onclick}
            >
                { label }
            </button>
        }
    };

    html! {
        <ContextProvider<EffectContext> context={(*effects).clone()}>
            <div class="page-shell">
                <header class="site-header">
                    <span class="brand">{"DropRegards"}</span>
                    <nav class="view-nav" aria-label="Main">
                        { nav_button(View::Home, "Home") }
                        { nav_button(View::Send, "Send") }
                        { nav_button(View::Dashboard, "Dashboard") }
                    </nav>
                    <WalletButton session={(*session).clone()} on_change={on_session_change} />
                </header>

                <main id="content">
                    { match *view {
                        View::Home => html! { <HomeView /> },
                        View::Send => html! { <SendView session={(*session).clone()} /> },
                        View::Dashboard => html! { <DashboardView /> },
                    } }
                </main>
            </div>
        </ContextProvider<EffectContext>>
    }
}

pub fn run() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);

    yew::Renderer::<App>::with_root(
        window()
            .and_then(|w| w.document())
            .and_then(|d| d.get_element_by_id("app"))
            .expect("missing #app mount point"),
    )
    .render();
}
