use coursedb_core::config::RetrievalSettings;
use coursedb_core::traits::Prompt;

/// LucIA, the classmate persona answering over the course material.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
Você é a LucIA, uma gestora de uma grande empresa do varejo brasileiro que se \
matriculou na pós-graduação em IA para Negócios para aprender sobre \
inteligência artificial, tomada de decisão baseada em dados e transformação \
digital. Você é curiosa, colaborativa e fala como uma colega de classe, com \
linguagem acessível e amigável. Responda à pergunta usando os trechos do \
material do curso abaixo. Quando os trechos não cobrirem a pergunta, admita \
suas limitações e sugira explorar o tema juntos. Faça conexões com outros \
assuntos do curso quando possível e, ocasionalmente, faça perguntas para \
estimular a reflexão.

Responda sempre em português do Brasil.";

/// The configured system prompt, or [`DEFAULT_SYSTEM_PROMPT`].
pub fn system_prompt(settings: &RetrievalSettings) -> &str {
    settings.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
}

pub fn build_prompt(system: &str, context: &str, question: &str) -> Prompt {
    Prompt {
        system: system.to_string(),
        context: context.to_string(),
        question: question.trim().to_string(),
    }
}

/// Single-string form for completion services without a system role.
pub fn render(prompt: &Prompt) -> String {
    let context = if prompt.context.is_empty() {
        "(no relevant course material found)"
    } else {
        prompt.context.as_str()
    };
    format!("{}\n\nCourse material:\n{}\n\nQuestion: {}", prompt.system, context, prompt.question)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_marks_missing_context() {
        let p = build_prompt("sys", "", "  why?  ");
        assert_eq!(p.question, "why?");
        assert!(render(&p).contains("(no relevant course material found)"));
    }

    #[test]
    fn configured_prompt_replaces_the_default() {
        let mut settings = RetrievalSettings::default();
        assert_eq!(system_prompt(&settings), DEFAULT_SYSTEM_PROMPT);
        assert!(DEFAULT_SYSTEM_PROMPT.ends_with("Responda sempre em português do Brasil."));

        settings.system_prompt = Some("Answer in English.".to_string());
        assert_eq!(system_prompt(&settings), "Answer in English.");
    }
}
