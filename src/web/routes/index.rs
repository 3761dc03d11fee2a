//! Main page: environment picker, hyperparameter form, training controls
//! and the gameplay video gallery. Rendered from the static tables.

use std::convert::Infallible;
use std::fmt::Write as _;

use hyper::{Body, Response};

use crate::config::{PARAM_DETAILS, PIXEL_ENVIRONMENTS, REGULAR_ENVIRONMENTS};
use crate::web::response_helpers::html_response;

pub async fn handle() -> Result<Response<Body>, Infallible> {
    Ok(html_response(render_index_page()))
}

fn render_index_page() -> String {
    let mut env_options = String::new();
    let _ = write!(env_options, r#"<optgroup label="Pixel (NES)">"#);
    for env in PIXEL_ENVIRONMENTS {
        let _ = write!(env_options, r#"<option value="{0}">{0}</option>"#, env.name);
    }
    let _ = write!(env_options, r#"</optgroup><optgroup label="Classic control">"#);
    for env in REGULAR_ENVIRONMENTS {
        let selected = if env.name == "cartpole" { " selected" } else { "" };
        let _ = write!(
            env_options,
            r#"<option value="{0}"{1}>{0}</option>"#,
            env.name, selected
        );
    }
    let _ = write!(env_options, "</optgroup>");

    let mut param_rows = String::new();
    for detail in PARAM_DETAILS {
        let _ = write!(
            param_rows,
            r#"<div class="param-row">
  <label for="{name}">{label}</label>
  <input type="range" id="{name}_slider" min="{min}" max="{max}" step="{step}" value="{default}">
  <input type="number" id="{name}" name="{name}" min="{min}" max="{max}" step="{step}" value="{default}">
</div>
"#,
            name = detail.name,
            label = detail.name.replace('_', " "),
            min = detail.min,
            max = detail.max,
            step = detail.step,
            default = detail.default,
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Gym Trainer</title>
<style>
body {{ font-family: sans-serif; max-width: 720px; margin: 2em auto; color: #222; }}
fieldset {{ margin-bottom: 1em; border: 1px solid #ccc; border-radius: 4px; }}
.param-row {{ display: grid; grid-template-columns: 14em 1fr 7em; gap: 0.6em; margin: 0.4em 0; align-items: center; }}
button {{ padding: 0.5em 1.2em; margin-right: 0.5em; }}
#trainingStatus.running {{ color: #2a7; font-weight: bold; }}
#trainingStatus.idle {{ color: #888; }}
#videos li {{ margin: 0.3em 0; }}
</style>
</head>
<body>
<h1>Gym Trainer</h1>

<form id="configForm" onsubmit="return false;">
  <fieldset>
    <legend>Environment</legend>
    <select name="environment" id="environment">{env_options}</select>
    <label style="margin-left:1.5em">Timesteps
      <input type="number" name="num_timestamps" id="num_timestamps" min="10000" max="50000000" step="10000" value="1000000">
    </label>
  </fieldset>

  <fieldset>
    <legend>Hyperparameters</legend>
    <label><input type="checkbox" id="hyperparameterToggle" name="hyperparameterToggle" checked>
      Use library defaults</label>
    <div id="paramInputs">
{param_rows}    </div>
  </fieldset>

  <button id="startTraining">Start training</button>
  <button id="stopTraining" disabled>Stop training</button>
  <span id="trainingStatus" class="idle">Not training</span>
</form>

<h2>Recorded gameplay</h2>
<ul id="videos"><li>Loading…</li></ul>

<script>
(function () {{
  var params = document.querySelectorAll('#paramInputs input[type=number]');
  params.forEach(function (input) {{
    var slider = document.getElementById(input.id + '_slider');
    if (!slider) return;
    slider.addEventListener('input', function () {{ input.value = slider.value; }});
    input.addEventListener('input', function () {{ slider.value = input.value; }});
  }});

  function pollTrainingStatus() {{
    fetch('/training_status')
      .then(function (r) {{ return r.json(); }})
      .then(function (data) {{
        document.getElementById('startTraining').disabled = data.is_training;
        document.getElementById('stopTraining').disabled = !data.is_training;
        var status = document.getElementById('trainingStatus');
        status.textContent = data.is_training ? 'Training in progress' : 'Not training';
        status.className = data.is_training ? 'running' : 'idle';
        setTimeout(pollTrainingStatus, data.is_training ? 1000 : 5000);
      }})
      .catch(function () {{ setTimeout(pollTrainingStatus, 5000); }});
  }}
  pollTrainingStatus();

  document.getElementById('startTraining').addEventListener('click', function () {{
    var form = document.getElementById('configForm');
    var data = new URLSearchParams(new FormData(form));
    var toggle = document.getElementById('hyperparameterToggle');
    data.set('hyperparameterToggle', toggle.checked ? 'on' : 'off');
    fetch('/start_training', {{ method: 'POST', body: data }})
      .then(function (r) {{ return r.json(); }})
      .then(function (res) {{
        if (res.status !== 'started') alert(res.message || 'Failed to start training');
        pollTrainingStatus();
      }});
  }});

  document.getElementById('stopTraining').addEventListener('click', function () {{
    fetch('/stop_training', {{ method: 'POST' }})
      .then(function (r) {{ return r.json(); }})
      .then(function () {{ pollTrainingStatus(); }});
  }});

  fetch('/videos')
    .then(function (r) {{ return r.json(); }})
    .then(function (videos) {{
      var list = document.getElementById('videos');
      list.innerHTML = '';
      if (!videos.length) {{
        list.innerHTML = '<li>No recordings yet</li>';
        return;
      }}
      videos.forEach(function (v) {{
        var li = document.createElement('li');
        var a = document.createElement('a');
        a.href = '/static/videos/' + v.file;
        a.textContent = v.name;
        li.appendChild(a);
        list.appendChild(li);
      }});
    }});
}})();
</script>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_lists_every_environment() {
        let page = render_index_page();
        for env in crate::config::env_list() {
            assert!(page.contains(&format!(r#"value="{env}""#)), "{env} missing");
        }
    }

    #[test]
    fn test_page_renders_every_hyperparameter_input() {
        let page = render_index_page();
        for detail in PARAM_DETAILS {
            assert!(
                page.contains(&format!(r#"name="{}""#, detail.name)),
                "{} missing",
                detail.name
            );
        }
    }
}
