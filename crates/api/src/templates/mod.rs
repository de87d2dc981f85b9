//! Server-rendered HTML
//!
//! Pages are small enough that plain string building beats a template
//! engine. Every dynamic value goes through [`escape_html`].

const STYLE: &str = include_str!("style.css");
const CHAT_SCRIPT: &str = include_str!("chat.js");

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn layout(title: &str, body: &str, script: Option<&str>) -> String {
    let script = script
        .map(|s| format!("<script>{}</script>", s))
        .unwrap_or_default();
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} · Paychat</title>
<style>{style}</style>
</head>
<body>
<header class="topbar"><a href="/" class="brand">Paychat</a></header>
<main>{body}</main>
{script}
</body>
</html>"#,
        title = escape_html(title),
        style = STYLE,
        body = body,
        script = script,
    )
}

const LOGOUT_SCRIPT: &str = r#"
document.querySelectorAll('[data-logout]').forEach(function (btn) {
  btn.addEventListener('click', async function () {
    await fetch('/api/auth/logout', { method: 'POST', credentials: 'same-origin' });
    window.location.href = '/';
  });
});
"#;

/// What the home page offers the visitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HomeView {
    Anonymous,
    SignedIn { email: Option<String>, subscribed: bool },
}

pub fn home(view: &HomeView) -> String {
    let body = match view {
        HomeView::Anonymous => r#"<section class="card hero">
<h1>Chat with an AI assistant</h1>
<p>Subscribe once, then chat as much as you like.</p>
<div class="actions"><a class="button" href="/signup">Sign up</a><a class="button secondary" href="/login">Log in</a></div>
</section>"#
            .to_string(),
        HomeView::SignedIn { email, subscribed } => {
            let greeting = email
                .as_deref()
                .map(|e| format!("Signed in as <strong>{}</strong>", escape_html(e)))
                .unwrap_or_else(|| "Signed in".to_string());
            let primary = if *subscribed {
                r#"<a class="button" href="/chat">Open chat</a>"#
            } else {
                r#"<a class="button" href="/paywall">Subscribe to start chatting</a>"#
            };
            format!(
                r#"<section class="card hero">
<h1>Welcome back</h1>
<p>{greeting}</p>
<div class="actions">{primary}<button class="button secondary" type="button" data-logout>Log out</button></div>
</section>"#
            )
        }
    };

    let script = matches!(view, HomeView::SignedIn { .. }).then_some(LOGOUT_SCRIPT);
    layout("Home", &body, script)
}

/// Flash messages and the post-login target carried in the query string
#[derive(Debug, Clone, Default)]
pub struct FormFlash<'a> {
    pub error: Option<&'a str>,
    pub notice: Option<&'a str>,
    pub next: Option<&'a str>,
}

fn flash_html(flash: &FormFlash<'_>) -> String {
    let mut out = String::new();
    if let Some(error) = flash.error {
        out.push_str(&format!(r#"<p class="flash error">{}</p>"#, escape_html(error)));
    }
    if let Some(notice) = flash.notice {
        out.push_str(&format!(r#"<p class="flash notice">{}</p>"#, escape_html(notice)));
    }
    out
}

fn credentials_form(action: &str, submit: &str, flash: &FormFlash<'_>) -> String {
    let next = flash
        .next
        .map(|n| format!(r#"<input type="hidden" name="next" value="{}">"#, escape_html(n)))
        .unwrap_or_default();
    format!(
        r#"{flash}<form class="stack" method="post" action="{action}">
<label>Email<input type="email" name="email" autocomplete="email" required></label>
<label>Password<input type="password" name="password" autocomplete="current-password" required minlength="6"></label>
{next}<button class="button" type="submit">{submit}</button>
</form>"#,
        flash = flash_html(flash),
        action = action,
        next = next,
        submit = submit,
    )
}

pub fn login(flash: &FormFlash<'_>) -> String {
    let body = format!(
        r#"<section class="card narrow"><h1>Log in</h1>{}<p class="muted">No account? <a href="/signup">Sign up</a></p></section>"#,
        credentials_form("/auth/login", "Log in", flash)
    );
    layout("Log in", &body, None)
}

pub fn signup(flash: &FormFlash<'_>) -> String {
    let flash = FormFlash { next: None, ..flash.clone() };
    let body = format!(
        r#"<section class="card narrow"><h1>Create an account</h1>{}<p class="muted">Already registered? <a href="/login">Log in</a></p></section>"#,
        credentials_form("/auth/signup", "Sign up", &flash)
    );
    layout("Sign up", &body, None)
}

const PAYWALL_SCRIPT: &str = r#"
var btn = document.getElementById('subscribe');
var err = document.getElementById('checkout-error');
btn.addEventListener('click', async function () {
  btn.disabled = true;
  err.textContent = '';
  try {
    var res = await fetch('/api/stripe/checkout', { method: 'POST', credentials: 'same-origin' });
    var data = await res.json();
    if (res.ok && data.url) {
      window.location.href = data.url;
      return;
    }
    err.textContent = data.error || 'Checkout failed';
  } catch (e) {
    err.textContent = 'Checkout failed';
  }
  btn.disabled = false;
});
"#;

pub fn paywall(email: Option<&str>) -> String {
    let who = email
        .map(|e| format!(r#"<p class="muted">Signed in as {}</p>"#, escape_html(e)))
        .unwrap_or_default();
    let body = format!(
        r#"<section class="card narrow">
<h1>Subscription required</h1>
<p>Chat is available to subscribers. Subscribe to get unlimited access.</p>
{who}
<button id="subscribe" class="button" type="button">Subscribe</button>
<p id="checkout-error" class="flash error" role="alert"></p>
</section>"#
    );
    layout("Subscribe", &body, Some(PAYWALL_SCRIPT))
}

pub fn chat() -> String {
    let body = r#"<section class="chat">
<div id="messages" class="messages" aria-live="polite"></div>
<form id="composer" class="composer">
<textarea id="input" rows="2" placeholder="Send a message" required></textarea>
<button class="button" type="submit" id="send">Send</button>
</form>
<p id="chat-error" class="flash error" role="alert"></p>
</section>"#;
    layout("Chat", body, Some(CHAT_SCRIPT))
}

pub fn subscribe_success() -> String {
    let body = r#"<section class="card narrow">
<h1>Thanks for subscribing!</h1>
<p>Your payment went through. Activation can take a few seconds while we hear back from Stripe.</p>
<a class="button" href="/chat">Go to chat</a>
</section>"#;
    layout("Subscribed", body, None)
}

pub fn subscribe_cancel() -> String {
    let body = r#"<section class="card narrow">
<h1>Checkout canceled</h1>
<p>No charge was made. You can subscribe whenever you are ready.</p>
<a class="button" href="/paywall">Back to subscription</a>
</section>"#;
    layout("Checkout canceled", body, None)
}
