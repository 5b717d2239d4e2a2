//! 研究流程各阶段的 prompt 模板
//!
//! 每个阶段一个构造函数，调用方只负责传入数据；输出格式由各自的 schema 约束。

use chrono::Local;

/// 研究员系统提示词（带当天日期）
pub fn system_prompt() -> String {
    let now = Local::now().format("%Y-%m-%d").to_string();
    format!(
        r#"You are an expert researcher. Today is {now}. Follow these instructions when responding:
  - You may be asked to research subjects that is after your knowledge cutoff, assume the user is right when presented with news.
  - The user is a highly experienced analyst, no need to simplify it, be as detailed as possible and make sure your response is correct.
  - Be highly organized.
  - Suggest solutions that I didn't think about.
  - Be proactive and anticipate my needs.
  - Treat me as an expert in all subject matter.
  - Mistakes erode my trust, so be accurate and thorough.
  - Provide detailed explanations, I'm comfortable with lots of detail.
  - Value good arguments over authorities, the source is irrelevant.
  - Consider new technologies and contrarian ideas, not just the conventional wisdom.
  - You may use high levels of speculation or prediction, just flag it for me."#
    )
}

/// 生成搜索查询；有先前要点时要求据此给出更具体的查询
pub fn serp_queries_prompt(topic: &str, prior_learnings: &[String], max_queries: usize) -> String {
    let mut prompt = format!(
        "Given the following prompt from the user, generate a list of SERP queries to research the topic. \
Return a maximum of {max_queries} queries, but feel free to return less if the original prompt is clear. \
Make sure each query is unique and not similar to each other: <prompt>{topic}</prompt>\n\n"
    );
    if !prior_learnings.is_empty() {
        prompt.push_str(&format!(
            "Here are some learnings from previous research, use them to generate more specific queries: {}",
            prior_learnings.join("\n")
        ));
    }
    prompt
}

/// 从搜索正文中提炼要点与后续方向；contents 须已按预算截断
pub fn learnings_prompt(query: &str, contents: &[String], max_learnings: usize) -> String {
    let wrapped = contents
        .iter()
        .map(|c| format!("<content>\n{c}\n</content>"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Given the following contents from a SERP search for the query <query>{query}</query>, \
generate a list of learnings from the contents. Return a maximum of {max_learnings} learnings, \
but feel free to return less if the contents are clear. Make sure each learning is unique and not similar to each other. \
The learnings should be concise and to the point, as detailed and information dense as possible. \
Make sure to include any entities like people, places, companies, products, things, etc in the learnings, \
as well as any exact metrics, numbers, or dates. The learnings will be used to research the topic further.\n\n\
<contents>{wrapped}</contents>"
    )
}

/// 下一层递归的研究主题：研究目标 + 后续方向
pub fn next_query(research_goal: &str, follow_ups: &[String]) -> String {
    let directions: String = follow_ups.iter().map(|q| format!("\n{q}")).collect();
    format!(
        "Previous research goal: {research_goal}\nFollow-up research directions: {directions}"
    )
    .trim()
    .to_string()
}

/// 把要点包进 <learning> 标签，换行分隔
pub fn learnings_block(learnings: &[String]) -> String {
    learnings
        .iter()
        .map(|l| format!("<learning>\n{l}\n</learning>"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 最终报告；learnings_block 须已按预算截断
pub fn report_prompt(topic: &str, learnings_block: &str) -> String {
    format!(
        "Given the following prompt from the user, write a final report on the topic using the learnings from research. \
Make it as detailed as possible, aim for 3 or more pages, include ALL the learnings from research:\n\n\
<prompt>{topic}</prompt>\n\n\
Here are all the learnings from previous research:\n\n<learnings>\n{learnings_block}\n</learnings>"
    )
}

/// 简短答案，格式跟随用户 prompt
pub fn answer_prompt(topic: &str, learnings_block: &str) -> String {
    format!(
        "Given the following prompt from the user, write a final answer on the topic using the learnings from research. \
Follow the format specified in the prompt. Do not yap or babble or include any other text than the answer besides the format specified in the prompt. \
Keep the answer as concise as possible - usually it should be just a few words or maximum a sentence. \
Try to follow the format specified in the prompt (for example, if the prompt is using Latex, the answer should be in Latex. \
If the prompt gives multiple answer choices, the answer should be one of the choices).\n\n\
<prompt>{topic}</prompt>\n\n\
Here are all the learnings from research on the topic that you can use to help answer the prompt:\n\n\
<learnings>\n{learnings_block}\n</learnings>"
    )
}

pub fn feedback_prompt(query: &str, max_questions: usize) -> String {
    format!(
        "Given the following query from the user, ask some follow up questions to clarify the research direction. \
Return a maximum of {max_questions} questions, but feel free to return less if the original query is clear: <query>{query}</query>"
    )
}
