use axum::response::Html;

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r##"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Exam Evaluator</title>
  <style>
    body { font-family: Helvetica, Arial, sans-serif; margin: 2rem auto; max-width: 960px; color: #1d1d1f; padding: 0 1rem; }
    h1 { margin-bottom: 0.25rem; }
    details { border: 1px solid #ddd; border-radius: 8px; padding: 0.5rem 1rem; margin-bottom: 0.75rem; }
    summary { cursor: pointer; font-weight: 600; }
    .card { border: 1px solid #ddd; padding: 1rem; border-radius: 8px; margin-bottom: 1rem; }
    label { display: block; margin-top: 0.75rem; font-weight: 600; }
    button { margin-top: 1rem; padding: 0.6rem 1.2rem; font-size: 1rem; }
    .error { color: #b00020; font-weight: 600; margin-top: 0.75rem; }
    .spinner { display: none; margin-top: 1rem; }
    .spinner.active { display: block; }
    table { border-collapse: collapse; width: 100%; margin: 0.5rem 0; }
    th { background: #add8e6; }
    td { background: #f5f5f5; }
    th, td { border: 1px solid #000; padding: 0.3rem 0.5rem; text-align: center; }
    hr { margin: 1.5rem 0; }
    #download { display: none; margin-top: 1rem; font-weight: 600; }
  </style>
</head>
<body>
  <h1>Exam Evaluator</h1>
  <p>
    Evaluate exam papers quickly. Upload solved exam papers and the matching
    marking schemes as PDFs and get a report card for each paper, with comments
    on every mistake, plus a final report with a result table and an overall
    analysis of the student's performance.
  </p>

  <details>
    <summary>How It Works</summary>
    <ol>
      <li><b>Upload</b> solved exam papers and their marking schemes as PDFs. The n-th exam is graded against the n-th marking scheme.</li>
      <li><b>Text extraction</b>: the text layer of every PDF is read page by page.</li>
      <li><b>Evaluation</b>: a language model compares each exam with its marking scheme, awards marks, comments on mistakes and writes a report card.</li>
      <li><b>Report generation</b>: the individual report cards are compiled into a final report with a result table and an overall analysis.</li>
      <li><b>Download</b>: the final report can be downloaded as a PDF.</li>
    </ol>
  </details>

  <details>
    <summary>Limitations</summary>
    <ol>
      <li><b>Accuracy</b>: grading relies on the text extracted from the PDFs. Scanned papers without a text layer cannot be read, and unusual fonts can garble the text.</li>
      <li><b>File formats</b>: only PDF files are accepted.</li>
      <li><b>Assessment criteria</b>: answers are judged strictly against the marking scheme. Partial credit is only given where the scheme allows it.</li>
      <li><b>Length</b>: very long papers or schemes may exceed the model's context window.</li>
      <li><b>Inputs</b>: the number of exam papers and marking schemes must be equal. Generated reports cannot be edited.</li>
    </ol>
  </details>

  <details id="samplesBox">
    <summary>Download Sample Files</summary>
    <ul id="samples"><li>No sample files available.</li></ul>
  </details>

  <div class="card">
    <h2>Upload files</h2>
    <form id="evalForm">
      <label for="examFiles">Solved exam papers</label>
      <input id="examFiles" name="exam_files" type="file" accept="application/pdf,.pdf" multiple />
      <label for="schemeFiles">Solved marking schemes</label>
      <input id="schemeFiles" name="scheme_files" type="file" accept="application/pdf,.pdf" multiple />
      <label for="mode">Mode</label>
      <select id="mode" name="mode">
        <option value="batch">Batch: individual reports + final report</option>
        <option value="individual">Individual reports only</option>
      </select>
      <br />
      <button id="evaluateBtn" type="submit">Evaluate</button>
    </form>
    <div id="error" class="error"></div>
    <div id="spinner" class="spinner">Generating Report Card&hellip;</div>
  </div>

  <div id="results"></div>
  <a id="download" href="#">Download Report</a>

  <script>
    const MISMATCH = 'Please upload an equal number of exam papers and marking schemes.';
    const form = document.getElementById('evalForm');
    const examFiles = document.getElementById('examFiles');
    const schemeFiles = document.getElementById('schemeFiles');
    const errorBox = document.getElementById('error');
    const spinner = document.getElementById('spinner');
    const results = document.getElementById('results');
    const download = document.getElementById('download');
    const button = document.getElementById('evaluateBtn');

    function checkCounts() {
      const e = examFiles.files.length, s = schemeFiles.files.length;
      const mismatch = e > 0 && s > 0 && e !== s;
      errorBox.textContent = mismatch ? MISMATCH : '';
      button.disabled = mismatch || e === 0 || s === 0;
    }
    examFiles.addEventListener('change', checkCounts);
    schemeFiles.addEventListener('change', checkCounts);
    checkCounts();

    fetch('/api/samples').then(r => r.json()).then(samples => {
      if (!samples.length) return;
      const list = document.getElementById('samples');
      list.innerHTML = '';
      for (const s of samples) {
        const li = document.createElement('li');
        const a = document.createElement('a');
        a.href = '/api/samples/' + encodeURIComponent(s.name);
        a.textContent = 'Download ' + s.name;
        li.appendChild(a);
        list.appendChild(li);
      }
    }).catch(() => {});

    function section(html) {
      const div = document.createElement('div');
      div.innerHTML = '<hr>' + html;
      results.appendChild(div);
    }

    form.addEventListener('submit', async (ev) => {
      ev.preventDefault();
      results.innerHTML = '';
      download.style.display = 'none';
      errorBox.textContent = '';
      spinner.classList.add('active');
      button.disabled = true;
      try {
        const resp = await fetch('/api/evaluate', { method: 'POST', body: new FormData(form) });
        const body = await resp.json();
        if (!resp.ok) {
          errorBox.textContent = body.error || ('Request failed: ' + resp.status);
          return;
        }
        for (const r of body.reports) {
          if (r.error) {
            section('<p class="error"></p>');
            results.lastChild.querySelector('.error').textContent = r.error;
          } else {
            section(r.html);
          }
        }
        if (body.final_report) section(body.final_report.html);
        if (body.pdf_base64) {
          const bytes = Uint8Array.from(atob(body.pdf_base64), c => c.charCodeAt(0));
          download.href = URL.createObjectURL(new Blob([bytes], { type: 'application/pdf' }));
          download.download = body.pdf_file_name;
          download.style.display = 'inline-block';
        } else if (body.pdf_error) {
          errorBox.textContent = body.pdf_error;
        }
      } catch (e) {
        errorBox.textContent = String(e);
      } finally {
        spinner.classList.remove('active');
        checkCounts();
      }
    });
  </script>
</body>
</html>
"##;
