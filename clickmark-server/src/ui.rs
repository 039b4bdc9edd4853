//! Server-rendered HTML pages
//!
//! Plain pages with just enough inline script to capture click coordinates
//! on stimulus images and videos and post them as JSON.

use axum::response::Html;

const STYLE: &str = r#"
    body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; margin: 0; padding: 20px;
           background-color: #1a1a1a; color: #e0e0e0; line-height: 1.6; }
    h1 { font-size: 26px; color: #4a9eff; }
    form { margin-bottom: 20px; }
    label { display: block; margin-top: 10px; }
    input, select, button, textarea { font-size: 16px; padding: 4px 8px; }
    .stimulus { position: relative; display: inline-block; margin: 10px; cursor: crosshair; }
    .stimulus img, .stimulus video { max-width: 640px; display: block; }
    .marker { position: absolute; width: 10px; height: 10px; margin: -5px 0 0 -5px;
              border-radius: 50%; background: #ff4a4a; pointer-events: none; }
    .status { color: #888; }
"#;

/// Click capture shared by the admin and task pages
///
/// `addStimulus(container, src)` appends a clickable image, or a muted looping
/// video for video files; `points` maps src to the last clicked coordinate in
/// the media's own pixel space.
const CLICK_SCRIPT: &str = r#"
const points = {};
const VIDEO_EXTENSIONS = /\.(mp4|webm|ogv|ogg|mov|m4v)$/i;
function isVideo(src) {
    return VIDEO_EXTENSIONS.test(src);
}
function addStimulus(container, src) {
    const wrap = document.createElement('div');
    wrap.className = 'stimulus';
    const url = '/uploads/' + encodeURIComponent(src);
    let media;
    if (isVideo(src)) {
        media = document.createElement('video');
        media.src = url;
        media.muted = true;
        media.loop = true;
        media.autoplay = true;
        media.playsInline = true;
    } else {
        media = document.createElement('img');
        media.src = url;
        media.alt = src;
    }
    wrap.appendChild(media);
    const marker = document.createElement('div');
    marker.className = 'marker';
    marker.style.display = 'none';
    wrap.appendChild(marker);
    media.addEventListener('click', (ev) => {
        const rect = media.getBoundingClientRect();
        const width = media.videoWidth || media.naturalWidth || rect.width;
        const scale = width / rect.width;
        const x = (ev.clientX - rect.left) * scale;
        const y = (ev.clientY - rect.top) * scale;
        points[src] = { x: x, y: y };
        marker.style.left = (ev.clientX - rect.left) + 'px';
        marker.style.top = (ev.clientY - rect.top) + 'px';
        marker.style.display = 'block';
    });
    container.appendChild(wrap);
}
"#;

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{style}</style>
</head>
<body>
<h1>{title}</h1>
{body}
</body>
</html>
"#,
        title = title,
        style = STYLE,
        body = body
    ))
}

pub fn login() -> Html<String> {
    page(
        "Login",
        r#"<form method="post" action="/login">
    <label>Username <input name="username" autocomplete="username" required></label>
    <label>Password <input name="password" type="password" autocomplete="current-password" required></label>
    <button type="submit">Log in</button>
</form>"#,
    )
}

/// Demographics form posting to `action`
pub fn demographics(action: &str) -> Html<String> {
    page(
        "About you",
        &format!(
            r#"<form method="post" action="{action}">
    <label>Participant ID <input name="participant_id" required></label>
    <label>Age <input name="age" type="number" min="0"></label>
    <label>Gender <input name="gender"></label>
    <label>Education <input name="education"></label>
    <label>Handedness
        <select name="handedness">
            <option value="right">Right</option>
            <option value="left">Left</option>
            <option value="both">Both</option>
        </select>
    </label>
    <label>Ethnicity <input name="ethnicity"></label>
    <button type="submit">Continue</button>
</form>"#,
            action = action
        ),
    )
}

pub fn instructions() -> Html<String> {
    page(
        "Instructions",
        r#"<p>You will be shown a series of images. For each image, click on the
location that answers the question shown above it.</p>
<form method="post" action="/instructions"><button type="submit">Next</button></form>"#,
    )
}

pub fn instructions2() -> Html<String> {
    page(
        "Instructions (continued)",
        r#"<p>You may click again to change your answer. When every image has a
marker, press Submit. Your answers cannot be changed after submitting.</p>
<form method="post" action="/instructions2"><button type="submit">Start</button></form>"#,
    )
}

/// Upload stimuli and record reference coordinates
pub fn admin() -> Html<String> {
    page(
        "Admin",
        &format!(
            r#"<form id="upload" method="post" action="/upload" enctype="multipart/form-data">
    <input type="file" name="files[]" accept="image/*,video/*" multiple>
    <button type="submit">Upload</button>
</form>
<label>Question <input id="question" size="60"></label>
<div id="stimuli"></div>
<button id="save">Save reference locations</button>
<p class="status" id="status"></p>
<form method="post" action="/logout"><button type="submit">Log out</button></form>
<script>
{script}
const stimuli = document.getElementById('stimuli');
const status = document.getElementById('status');
document.getElementById('upload').addEventListener('submit', async (ev) => {{
    ev.preventDefault();
    const res = await fetch('/upload', {{ method: 'POST', body: new FormData(ev.target) }});
    const body = await res.json();
    status.textContent = body.message;
    (body.files || []).forEach((src) => addStimulus(stimuli, src));
}});
document.getElementById('save').addEventListener('click', async () => {{
    const locations = Object.entries(points).map(([src, p]) =>
        ({{ initial_x: p.x, initial_y: p.y, src: src }}));
    const res = await fetch('/save_admin_locations', {{
        method: 'POST',
        headers: {{ 'Content-Type': 'application/json' }},
        body: JSON.stringify({{ question: document.getElementById('question').value, locations: locations }}),
    }});
    const body = await res.json();
    status.textContent = body.message || 'Save failed';
}});
</script>"#,
            script = CLICK_SCRIPT
        ),
    )
}

/// Participant task: click each reference stimulus, then submit
pub fn task() -> Html<String> {
    page(
        "Task",
        &format!(
            r#"<p id="question"></p>
<div id="stimuli"></div>
<button id="submit">Submit</button>
<script>
{script}
const stimuli = document.getElementById('stimuli');
let question = null;
fetch('/load_admin_locations').then((res) => res.json()).then((body) => {{
    const seen = new Set();
    body.locations.forEach((loc) => {{
        if (loc.question && question === null) {{
            question = loc.question;
            document.getElementById('question').textContent = question;
        }}
        if (loc.src && !seen.has(loc.src)) {{
            seen.add(loc.src);
            addStimulus(stimuli, loc.src);
        }}
    }});
}});
document.getElementById('submit').addEventListener('click', async () => {{
    const locations = Object.entries(points).map(([src, p]) =>
        ({{ final_x: p.x, final_y: p.y, src: src }}));
    const res = await fetch('/save_user_locations', {{
        method: 'POST',
        headers: {{ 'Content-Type': 'application/json' }},
        body: JSON.stringify({{ question: question, locations: locations }}),
    }});
    window.location = res.redirected ? res.url : '/end';
}});
</script>"#,
            script = CLICK_SCRIPT
        ),
    )
}

pub fn end() -> Html<String> {
    page("Thank you", "<p>Your answers have been recorded. You may close this window.</p>")
}
